//! Known object types and the class registry
//!
//! Every value decoded from a key or an object reference becomes an
//! [`Object`]: a tagged union over the classes this crate understands, a
//! [`Record`] for classes decoded through a stored schema, and [`Opaque`]
//! bytes for anything else. Classes map to decoders through a
//! [`ClassRegistry`] value owned by the file.

mod base;
mod containers;
mod registry;

pub use base::{AttFill, AttLine, AttMarker, Named, ObjString, ObjectHeader};
pub use containers::{ArrayD, ArrayI, List, ObjArray};
pub use registry::{ClassRegistry, DecodeFn};

use crate::rbytes::{Marshal, WBuffer};
use crate::rdict::{Record, StreamerElement, StreamerInfo};
use crate::riofs::DirectoryRecord;
use crate::rtree::{Basket, Branch, BranchElement, Leaf, Tree};
use crate::{Error, Result};

/// Bytes of a class no decoder or schema is known for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    pub class: String,
    pub bytes: Vec<u8>,
}

/// Any value stored in a file
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Object(ObjectHeader),
    Named(Named),
    ObjString(ObjString),
    List(List),
    ObjArray(ObjArray),
    ArrayI(ArrayI),
    ArrayD(ArrayD),
    StreamerInfo(Box<StreamerInfo>),
    StreamerElement(Box<StreamerElement>),
    Tree(Box<Tree>),
    Branch(Box<Branch>),
    BranchElement(Box<BranchElement>),
    Leaf(Box<Leaf>),
    Basket(Box<Basket>),
    Directory(DirectoryRecord),
    Generic(Record),
    Opaque(Opaque),
}

impl Object {
    /// Class name as written on the wire
    pub fn class(&self) -> &str {
        match self {
            Object::Object(o) => rootio_core::Object::class(o),
            Object::Named(o) => rootio_core::Object::class(o),
            Object::ObjString(o) => rootio_core::Object::class(o),
            Object::List(o) => rootio_core::Object::class(o),
            Object::ObjArray(o) => rootio_core::Object::class(o),
            Object::ArrayI(o) => rootio_core::Object::class(o),
            Object::ArrayD(o) => rootio_core::Object::class(o),
            Object::StreamerInfo(o) => rootio_core::Object::class(&**o),
            Object::StreamerElement(o) => rootio_core::Object::class(&**o),
            Object::Tree(o) => rootio_core::Object::class(&**o),
            Object::Branch(o) => rootio_core::Object::class(&**o),
            Object::BranchElement(o) => rootio_core::Object::class(&**o),
            Object::Leaf(o) => rootio_core::Object::class(&**o),
            Object::Basket(o) => rootio_core::Object::class(&**o),
            Object::Directory(o) => rootio_core::Object::class(o),
            Object::Generic(o) => &o.class,
            Object::Opaque(o) => &o.class,
        }
    }

    /// Name of named objects
    pub fn name(&self) -> Option<&str> {
        Some(match self {
            Object::Named(o) => &o.name,
            Object::List(o) => &o.name,
            Object::ObjArray(o) => &o.name,
            Object::StreamerInfo(o) => &o.name,
            Object::StreamerElement(o) => &o.name,
            Object::Tree(o) => &o.named.name,
            Object::Branch(o) => &o.named.name,
            Object::BranchElement(o) => &o.branch.named.name,
            Object::Leaf(o) => &o.named.name,
            Object::Basket(o) => o.key.name(),
            _ => return None,
        })
    }

    pub fn title(&self) -> Option<&str> {
        Some(match self {
            Object::Named(o) => &o.title,
            Object::StreamerInfo(o) => &o.title,
            Object::StreamerElement(o) => &o.title,
            Object::Tree(o) => &o.named.title,
            Object::Branch(o) => &o.named.title,
            Object::BranchElement(o) => &o.branch.named.title,
            Object::Leaf(o) => &o.named.title,
            Object::Basket(o) => o.key.title(),
            _ => return None,
        })
    }

    /// String payload of a `TObjString`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::ObjString(s) => Some(&s.value),
            _ => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Object::Opaque(_))
    }
}

impl rootio_core::Object for Object {
    fn class(&self) -> &str {
        Object::class(self)
    }
}

impl Marshal for Object {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        match self {
            Object::Object(o) => o.marshal(w),
            Object::Named(o) => o.marshal(w),
            Object::ObjString(o) => o.marshal(w),
            Object::List(o) => o.marshal(w),
            Object::ObjArray(o) => o.marshal(w),
            Object::ArrayI(o) => o.marshal(w),
            Object::ArrayD(o) => o.marshal(w),
            Object::StreamerInfo(o) => o.marshal(w),
            Object::StreamerElement(o) => o.marshal(w),
            Object::Tree(o) => o.marshal(w),
            Object::Branch(o) => o.marshal(w),
            Object::BranchElement(o) => o.marshal(w),
            Object::Leaf(o) => o.marshal(w),
            Object::Basket(o) => o.marshal(w),
            Object::Directory(o) => o.marshal(w),
            Object::Generic(o) => o.marshal(w),
            Object::Opaque(o) => {
                w.write_bytes(&o.bytes);
                Ok(())
            }
        }
    }

    fn identity(&self) -> Option<String> {
        match self {
            Object::Leaf(leaf) => leaf.identity(),
            _ => None,
        }
    }
}

macro_rules! object_conversions {
    (plain: $($variant:ident($ty:ty)),*; boxed: $($bvariant:ident($bty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Object {
                fn from(v: $ty) -> Self {
                    Object::$variant(v)
                }
            }

            impl TryFrom<Object> for $ty {
                type Error = Error;

                fn try_from(obj: Object) -> Result<Self> {
                    match obj {
                        Object::$variant(v) => Ok(v),
                        other => Err(Error::mismatch(stringify!($variant), other.class())),
                    }
                }
            }
        )*
        $(
            impl From<$bty> for Object {
                fn from(v: $bty) -> Self {
                    Object::$bvariant(Box::new(v))
                }
            }

            impl TryFrom<Object> for $bty {
                type Error = Error;

                fn try_from(obj: Object) -> Result<Self> {
                    match obj {
                        Object::$bvariant(v) => Ok(*v),
                        other => Err(Error::mismatch(stringify!($bvariant), other.class())),
                    }
                }
            }
        )*
    };
}

object_conversions! {
    plain: Named(Named), ObjString(ObjString), List(List), ObjArray(ObjArray),
        ArrayI(ArrayI), ArrayD(ArrayD), Directory(DirectoryRecord), Generic(Record), Opaque(Opaque);
    boxed: StreamerInfo(StreamerInfo), StreamerElement(StreamerElement), Tree(Tree),
        Branch(Branch), BranchElement(BranchElement), Leaf(Leaf), Basket(Basket),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let obj = Object::from(ObjString::new("hello"));
        assert_eq!(obj.class(), "TObjString");
        assert_eq!(obj.as_str(), Some("hello"));
        assert!(obj.name().is_none());

        let err = Named::try_from(obj.clone()).unwrap_err();
        assert_eq!(err.to_string(), "type mismatch: expected Named, found TObjString");
        let s = ObjString::try_from(obj).unwrap();
        assert_eq!(s.value, "hello");
    }

    #[test]
    fn test_opaque_marshal_is_verbatim() {
        let obj = Object::Opaque(Opaque {
            class: "TH1F".into(),
            bytes: vec![1, 2, 3],
        });
        let mut w = WBuffer::new(0);
        obj.marshal(&mut w).unwrap();
        assert_eq!(w.bytes(), &[1, 2, 3]);
        assert!(obj.is_opaque());
    }
}
