//! Class name to decoder table

use std::sync::OnceLock;

use hashbrown::HashMap;

use super::{ArrayD, ArrayI, List, Named, ObjArray, ObjString, Object, ObjectHeader, Opaque};
use crate::rbytes::{RBuffer, Unmarshal};
use crate::rdict::{StreamerElement, StreamerInfo};
use crate::riofs::DirectoryRecord;
use crate::rtree::{Basket, Branch, BranchElement, Leaf, Tree};
use crate::{Error, Result};

/// Decoder for one class; receives the class name so one function can serve
/// a family of classes
pub type DecodeFn = fn(&str, &mut RBuffer<'_>) -> Result<Object>;

fn decode_as<T>(_class: &str, r: &mut RBuffer<'_>) -> Result<Object>
where
    T: Unmarshal + Into<Object>,
{
    T::unmarshal(r).map(Into::into)
}

fn decode_object(_class: &str, r: &mut RBuffer<'_>) -> Result<Object> {
    ObjectHeader::unmarshal(r).map(Object::Object)
}

fn decode_element(class: &str, r: &mut RBuffer<'_>) -> Result<Object> {
    StreamerElement::unmarshal_class(class, r).map(Into::into)
}

fn decode_leaf(class: &str, r: &mut RBuffer<'_>) -> Result<Object> {
    Leaf::unmarshal_class(class, r).map(Into::into)
}

const BUILTIN: &[(&str, DecodeFn)] = &[
    ("TObject", decode_object),
    ("TNamed", decode_as::<Named>),
    ("TObjString", decode_as::<ObjString>),
    ("TList", decode_as::<List>),
    ("TObjArray", decode_as::<ObjArray>),
    ("TArrayI", decode_as::<ArrayI>),
    ("TArrayD", decode_as::<ArrayD>),
    ("TStreamerInfo", decode_as::<StreamerInfo>),
    ("TStreamerBase", decode_element),
    ("TStreamerBasicType", decode_element),
    ("TStreamerBasicPointer", decode_element),
    ("TStreamerLoop", decode_element),
    ("TStreamerObject", decode_element),
    ("TStreamerObjectPointer", decode_element),
    ("TStreamerObjectAny", decode_element),
    ("TStreamerObjectAnyPointer", decode_element),
    ("TStreamerString", decode_element),
    ("TStreamerSTL", decode_element),
    ("TStreamerSTLstring", decode_element),
    ("TStreamerArtificial", decode_element),
    ("TTree", decode_as::<Tree>),
    ("TBranch", decode_as::<Branch>),
    ("TBranchElement", decode_as::<BranchElement>),
    ("TLeafO", decode_leaf),
    ("TLeafB", decode_leaf),
    ("TLeafS", decode_leaf),
    ("TLeafI", decode_leaf),
    ("TLeafL", decode_leaf),
    ("TLeafF", decode_leaf),
    ("TLeafD", decode_leaf),
    ("TLeafD32", decode_leaf),
    ("TLeafF16", decode_leaf),
    ("TLeafC", decode_leaf),
    ("TLeafElement", decode_leaf),
    ("TBasket", decode_as::<Basket>),
    ("TDirectory", decode_as::<DirectoryRecord>),
    ("TDirectoryFile", decode_as::<DirectoryRecord>),
];

/// Maps class names to decoders
///
/// Lookups fall back to the schemas of the buffer's streamer catalog, then
/// to [`Opaque`] bytes when the record length is known.
#[derive(Clone)]
pub struct ClassRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.decoders.len())
            .finish()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// Registry holding every built-in class
    pub fn new() -> Self {
        let mut decoders = HashMap::with_capacity(BUILTIN.len());
        for (class, f) in BUILTIN {
            decoders.insert((*class).to_owned(), *f);
        }
        Self { decoders }
    }

    /// Registry without any class
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Shared immutable instance of [`ClassRegistry::new`]
    pub fn builtin() -> &'static ClassRegistry {
        static BUILTIN_REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();
        BUILTIN_REGISTRY.get_or_init(ClassRegistry::new)
    }

    /// Add or replace the decoder of `class`
    pub fn register(&mut self, class: impl Into<String>, decoder: DecodeFn) {
        self.decoders.insert(class.into(), decoder);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.decoders.contains_key(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Decode a value of `class` at the cursor
    ///
    /// `end` is the absolute end of the value when the framing declares it;
    /// without it an unknown class cannot be skipped and fails.
    pub fn decode(&self, class: &str, r: &mut RBuffer<'_>, end: Option<u64>) -> Result<Object> {
        if let Some(decode) = self.decoders.get(class) {
            return decode(class, r);
        }

        if let Some(catalog) = r.context().streamers {
            if catalog.knows(class) {
                return catalog.decode(class, r, None).map(Object::Generic);
            }
        }

        match end {
            Some(end) => {
                let n = end.checked_sub(r.pos()).ok_or_else(|| {
                    Error::corrupt(class, format!("record end {end} before cursor {}", r.pos()))
                })?;
                let bytes = r.read_bytes(n as usize)?.to_vec();
                tracing::debug!(class, len = bytes.len(), "no decoder for class, kept opaque");
                Ok(Object::Opaque(Opaque {
                    class: class.to_owned(),
                    bytes,
                }))
            }
            None => Err(Error::UnknownClass(class.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbytes::WBuffer;

    #[test]
    fn test_builtin_classes() {
        let reg = ClassRegistry::builtin();
        for class in ["TNamed", "TList", "TStreamerInfo", "TTree", "TLeafI", "TDirectory"] {
            assert!(reg.contains(class), "{class}");
        }
        assert!(!reg.contains("TH1F"));
    }

    #[test]
    fn test_unknown_class_kept_opaque() {
        let mut w = WBuffer::new(0);
        w.write_object_any(Some(&Object::Opaque(Opaque {
            class: "TH1F".into(),
            bytes: vec![9, 8, 7, 6],
        })))
        .unwrap();
        w.write_object_any(Some(&Named::new("after", ""))).unwrap();
        let bytes = w.into_bytes();

        let mut r = RBuffer::new(&bytes, 0);
        let first = r.read_object_any().unwrap().unwrap();
        let second = r.read_object_any().unwrap().unwrap();
        assert!(matches!(&first, Object::Opaque(o) if o.class == "TH1F" && o.bytes == [9, 8, 7, 6]));
        assert_eq!(second.name(), Some("after"));
    }

    #[test]
    fn test_unknown_class_without_end() {
        let bytes = [0u8; 4];
        let mut r = RBuffer::new(&bytes, 0);
        let err = ClassRegistry::empty().decode("TH1F", &mut r, None).unwrap_err();
        assert!(matches!(err, Error::UnknownClass(c) if c == "TH1F"));
    }

    #[test]
    fn test_register_custom_decoder() {
        fn as_string(_: &str, r: &mut RBuffer<'_>) -> Result<Object> {
            Ok(Object::ObjString(ObjString::new(r.read_string()?)))
        }
        let mut reg = ClassRegistry::empty();
        reg.register("MyString", as_string);

        let mut w = WBuffer::new(0);
        w.write_string("custom");
        let bytes = w.into_bytes();
        let obj = reg.decode("MyString", &mut RBuffer::new(&bytes, 0), None).unwrap();
        assert_eq!(obj.as_str(), Some("custom"));
    }
}
