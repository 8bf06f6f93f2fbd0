//! `TObject`, `TNamed`, `TObjString` and the drawing attribute records
//!
//! Attribute records carry no meaning for I/O; they are kept so trees
//! round-trip byte for byte.

use rootio_core::format::constants::tags::{IS_ON_HEAP, IS_REFERENCED, NOT_DELETED};

use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::Result;

/// The `TObject` header every ROOT object starts with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectHeader {
    pub id: u32,
    pub bits: u32,
}

impl ObjectHeader {
    pub const VERSION: i16 = 1;
}

impl rootio_core::Object for ObjectHeader {
    fn class(&self) -> &str {
        "TObject"
    }
}

impl Unmarshal for ObjectHeader {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        r.skip_version("TObject")?;
        let id = r.read_u32()?;
        let bits = r.read_u32()?;
        if bits & IS_REFERENCED != 0 {
            r.read_u16()?;
        }
        Ok(Self { id, bits })
    }
}

impl Marshal for ObjectHeader {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        w.write_i16(Self::VERSION);
        w.write_u32(self.id);
        w.write_u32(self.bits & !(IS_ON_HEAP | NOT_DELETED | IS_REFERENCED));
        Ok(())
    }
}

/// `TNamed`: an object with a name and a title
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Named {
    pub object: ObjectHeader,
    pub name: String,
    pub title: String,
}

impl Named {
    pub const VERSION: i16 = 1;

    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            object: ObjectHeader::default(),
            name: name.into(),
            title: title.into(),
        }
    }
}

impl rootio_core::Object for Named {
    fn class(&self) -> &str {
        "TNamed"
    }
}

impl rootio_core::Named for Named {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Unmarshal for Named {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TNamed")?;
        let object = ObjectHeader::unmarshal(r)?;
        let name = r.read_string()?;
        let title = r.read_string()?;
        r.check_byte_count(&v, "TNamed")?;
        Ok(Self { object, name, title })
    }
}

impl Marshal for Named {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        self.object.marshal(w)?;
        w.write_string(&self.name);
        w.write_string(&self.title);
        w.set_byte_count(start, "TNamed")
    }
}

/// `TObjString`: a string stored as an object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjString {
    pub object: ObjectHeader,
    pub value: String,
}

impl ObjString {
    pub const VERSION: i16 = 1;

    pub fn new(value: impl Into<String>) -> Self {
        Self {
            object: ObjectHeader::default(),
            value: value.into(),
        }
    }
}

impl rootio_core::Object for ObjString {
    fn class(&self) -> &str {
        "TObjString"
    }
}

impl Unmarshal for ObjString {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TObjString")?;
        let object = ObjectHeader::unmarshal(r)?;
        let value = r.read_string()?;
        r.check_byte_count(&v, "TObjString")?;
        Ok(Self { object, value })
    }
}

impl Marshal for ObjString {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        self.object.marshal(w)?;
        w.write_string(&self.value);
        w.set_byte_count(start, "TObjString")
    }
}

/// Declare an attribute record: a versioned envelope around a few scalars
macro_rules! attribute_record {
    ($(#[$doc:meta])* $ty:ident, $class:literal, $version:literal, { $($field:ident: $fty:ty = $default:expr),* $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $ty {
            $(pub $field: $fty,)*
        }

        impl $ty {
            pub const VERSION: i16 = $version;
        }

        impl Default for $ty {
            fn default() -> Self {
                Self { $($field: $default,)* }
            }
        }

        impl rootio_core::Object for $ty {
            fn class(&self) -> &str {
                $class
            }
        }

        impl Unmarshal for $ty {
            fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
                let v = r.read_version($class)?;
                let out = Self { $($field: r.read::<$fty>()?,)* };
                r.check_byte_count(&v, $class)?;
                Ok(out)
            }
        }

        impl Marshal for $ty {
            fn marshal(&self, w: &mut WBuffer) -> Result<()> {
                let start = w.write_version(Self::VERSION);
                $(w.write(self.$field);)*
                w.set_byte_count(start, $class)
            }
        }
    };
}

attribute_record!(
    /// `TAttLine`
    AttLine, "TAttLine", 2, { color: i16 = 1, style: i16 = 1, width: i16 = 1 }
);

attribute_record!(
    /// `TAttFill`
    AttFill, "TAttFill", 2, { color: i16 = 0, style: i16 = 1001 }
);

attribute_record!(
    /// `TAttMarker`
    AttMarker, "TAttMarker", 2, { color: i16 = 1, style: i16 = 1, size: f32 = 1.0 }
);

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_named_layout() {
        let named = Named::new("px", "momentum");
        let mut w = WBuffer::new(0);
        named.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();
        // 6 envelope + 10 TObject + 3 + 9
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[..4], &(24u32 | 0x4000_0000).to_be_bytes());

        let mut r = RBuffer::new(&bytes, 0);
        let back = Named::unmarshal(&mut r).unwrap();
        assert_eq!(back.name, "px");
        assert_eq!(back.title, "momentum");
        assert!(r.is_empty());
    }

    #[test]
    fn test_corrupted_byte_count_is_detected() {
        let mut w = WBuffer::new(0);
        ObjString::new("hello").marshal(&mut w).unwrap();
        let mut bytes = w.into_bytes();
        bytes[3] += 1;
        let err = ObjString::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap_err();
        assert!(err.to_string().contains("read too few bytes"));
    }

    #[test]
    fn test_referenced_object_reads_pid() {
        let mut w = WBuffer::new(0);
        w.write_i16(1);
        w.write_u32(7);
        w.write_u32(IS_REFERENCED);
        w.write_u16(3);
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        let obj = ObjectHeader::unmarshal(&mut r).unwrap();
        assert_eq!(obj.id, 7);
        assert!(r.is_empty());
    }

    #[test]
    fn test_attributes() {
        let mut w = WBuffer::new(0);
        AttLine::default().marshal(&mut w).unwrap();
        AttFill::default().marshal(&mut w).unwrap();
        AttMarker { size: 2.5, ..Default::default() }.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), (6 + 6) + (6 + 4) + (6 + 8));

        let mut r = RBuffer::new(&bytes, 0);
        assert_eq!(AttLine::unmarshal(&mut r).unwrap(), AttLine::default());
        assert_eq!(AttFill::unmarshal(&mut r).unwrap().style, 1001);
        assert_eq!(AttMarker::unmarshal(&mut r).unwrap().size, 2.5);
    }

    proptest! {
        #[test]
        fn prop_damaged_byte_count_fails(at in 0usize..4, flip in 1u8..=0xFF) {
            let line = AttLine { color: 4, style: 2, width: 3 };
            let mut w = WBuffer::new(0);
            line.marshal(&mut w).unwrap();
            let mut bytes = w.into_bytes();
            bytes[at] ^= flip;
            let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            // a zero count disables the check
            prop_assume!(word & !0x4000_0000 != 0);

            let mut r = RBuffer::new(&bytes, 0);
            let first = AttLine::unmarshal(&mut r).unwrap_err();
            prop_assert!(first.is_corruption(), "{}", first);
            prop_assert_eq!(r.check().unwrap_err().to_string(), first.to_string());
            let again = AttLine::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap_err();
            prop_assert_eq!(again.to_string(), first.to_string());
        }
    }
}
