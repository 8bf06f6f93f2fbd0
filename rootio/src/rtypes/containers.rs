//! Object collections and numeric arrays

use super::base::ObjectHeader;
use super::Object;
use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::{Error, Result};

/// `TList`: ordered objects, each with an option string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List {
    pub object: ObjectHeader,
    pub name: String,
    pub items: Vec<Object>,
}

impl List {
    pub const VERSION: i16 = 5;

    pub fn new(items: Vec<Object>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Object> {
        self.items.iter()
    }
}

impl rootio_core::Object for List {
    fn class(&self) -> &str {
        "TList"
    }
}

impl Unmarshal for List {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TList")?;
        if v.version <= 3 {
            return r.fail(Error::UnsupportedEncoding(format!(
                "TList version {} is too old",
                v.version
            )));
        }
        let object = ObjectHeader::unmarshal(r)?;
        let name = r.read_string()?;
        let n = r.read_i32()?;
        if n < 0 {
            return r.fail(Error::corrupt("TList", format!("negative size {n}")));
        }
        let mut items = Vec::with_capacity((n as usize).min(r.len()));
        for _ in 0..n {
            let item = r.read_object_any()?;
            r.read_string()?;
            match item {
                Some(obj) => items.push(obj),
                None => tracing::trace!("null TList entry dropped"),
            }
        }
        r.check_byte_count(&v, "TList")?;
        Ok(Self { object, name, items })
    }
}

impl Marshal for List {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        self.object.marshal(w)?;
        w.write_string(&self.name);
        w.write_i32(self.items.len() as i32);
        for item in &self.items {
            w.write_object_any(Some(item))?;
            w.write_string("");
        }
        w.set_byte_count(start, "TList")
    }
}

/// `TObjArray`: indexed slots, some of which may be empty
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjArray {
    pub object: ObjectHeader,
    pub name: String,
    pub lower_bound: i32,
    pub slots: Vec<Option<Object>>,
}

impl ObjArray {
    pub const VERSION: i16 = 3;

    pub fn new(items: impl IntoIterator<Item = Object>) -> Self {
        Self {
            slots: items.into_iter().map(Some).collect(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Non-empty slots in order
    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.slots.iter().flatten()
    }
}

impl rootio_core::Object for ObjArray {
    fn class(&self) -> &str {
        "TObjArray"
    }
}

impl Unmarshal for ObjArray {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TObjArray")?;
        let object = if v.version > 2 {
            ObjectHeader::unmarshal(r)?
        } else {
            ObjectHeader::default()
        };
        let name = if v.version > 1 { r.read_string()? } else { String::new() };
        let n = r.read_i32()?;
        let lower_bound = r.read_i32()?;
        if n < 0 {
            return r.fail(Error::corrupt("TObjArray", format!("negative size {n}")));
        }
        let mut slots = Vec::with_capacity((n as usize).min(r.len()));
        for _ in 0..n {
            slots.push(r.read_object_any()?);
        }
        r.check_byte_count(&v, "TObjArray")?;
        Ok(Self { object, name, lower_bound, slots })
    }
}

impl Marshal for ObjArray {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        self.object.marshal(w)?;
        w.write_string(&self.name);
        w.write_i32(self.slots.len() as i32);
        w.write_i32(self.lower_bound);
        for slot in &self.slots {
            w.write_object_any(slot.as_ref().map(|obj| obj as &dyn Marshal))?;
        }
        w.set_byte_count(start, "TObjArray")
    }
}

macro_rules! numeric_array {
    ($(#[$doc:meta])* $ty:ident, $class:literal, $elem:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $ty {
            pub data: Vec<$elem>,
        }

        impl rootio_core::Object for $ty {
            fn class(&self) -> &str {
                $class
            }
        }

        impl Unmarshal for $ty {
            fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
                Ok(Self { data: r.read_static_array()? })
            }
        }

        impl Marshal for $ty {
            fn marshal(&self, w: &mut WBuffer) -> Result<()> {
                w.write_static_array(&self.data);
                Ok(())
            }
        }
    };
}

numeric_array!(
    /// `TArrayI`
    ArrayI, "TArrayI", i32
);
numeric_array!(
    /// `TArrayD`
    ArrayD, "TArrayD", f64
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtypes::{Named, ObjString};

    #[test]
    fn test_list_roundtrip() {
        let list = List::new(vec![
            Object::ObjString(ObjString::new("a")),
            Object::Named(Named::new("n", "t")),
            Object::ObjString(ObjString::new("b")),
        ]);
        let mut w = WBuffer::new(0);
        list.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();

        let back = List::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap();
        assert_eq!(back.len(), 3);
        let classes: Vec<&str> = back.iter().map(|o| o.class()).collect();
        assert_eq!(classes, ["TObjString", "TNamed", "TObjString"]);
    }

    #[test]
    fn test_obj_array_keeps_null_slots() {
        let mut arr = ObjArray::new([Object::Named(Named::new("x", ""))]);
        arr.slots.push(None);
        arr.lower_bound = 0;
        let mut w = WBuffer::new(0);
        arr.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();

        let back = ObjArray::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap();
        assert_eq!(back.len(), 2);
        assert!(back.slots[1].is_none());
        assert_eq!(back.iter().count(), 1);
    }

    #[test]
    fn test_numeric_arrays() {
        let mut w = WBuffer::new(0);
        ArrayI { data: vec![1, 2, 3] }.marshal(&mut w).unwrap();
        ArrayD { data: vec![] }.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 4 + 12 + 4);

        let mut r = RBuffer::new(&bytes, 0);
        assert_eq!(ArrayI::unmarshal(&mut r).unwrap().data, vec![1, 2, 3]);
        assert!(ArrayD::unmarshal(&mut r).unwrap().data.is_empty());
    }
}
