//! Abstract interfaces shared by the format and I/O crates

pub mod object;
pub mod source;

pub use object::{Named, Object};
pub use source::ByteSource;
