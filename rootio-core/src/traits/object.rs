//! Identity traits shared by every stored object

/// An object that knows the class name it is stored under
pub trait Object {
    fn class(&self) -> &str;
}

/// An object carrying a name and a title
pub trait Named: Object {
    fn name(&self) -> &str;
    fn title(&self) -> &str;
}
