//! Stored class descriptors

use super::element::StreamerElement;
use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rtypes::{Named, ObjArray, Object};
use crate::{Error, Result};

/// Schema of one version of a class: its ordered members and checksum
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerInfo {
    pub name: String,
    pub title: String,
    pub checksum: u32,
    pub class_version: i32,
    pub elements: Vec<StreamerElement>,
}

impl StreamerInfo {
    pub const VERSION: i16 = 9;

    /// Descriptor with its checksum computed from the members
    pub fn new(class: &str, class_version: i32, elements: Vec<StreamerElement>) -> Self {
        let mut info = Self {
            name: class.to_owned(),
            title: String::new(),
            checksum: 0,
            class_version,
            elements,
        };
        info.checksum = info.compute_checksum();
        info
    }

    /// Member-name hash used by the format to tell schemas apart
    ///
    /// `id = id * 3 + byte` over the class name, the base class names, then
    /// each member's type name, name and array dimensions.
    pub fn compute_checksum(&self) -> u32 {
        fn mix(id: u32, text: &str) -> u32 {
            text.bytes()
                .fold(id, |id, b| id.wrapping_mul(3).wrapping_add(u32::from(b)))
        }

        let mut id = mix(0, &self.name);
        for base in self.elements.iter().filter(|e| e.is_base()) {
            id = mix(id, &base.name);
        }
        for member in self.elements.iter().filter(|e| !e.is_base()) {
            id = mix(id, &member.type_name);
            id = mix(id, &member.name);
            for dim in &member.max_index[..member.array_dim.clamp(0, 5) as usize] {
                id = id.wrapping_mul(3).wrapping_add(*dim as u32);
            }
        }
        id
    }

    pub fn element(&self, name: &str) -> Option<&StreamerElement> {
        self.elements.iter().find(|e| e.name == name)
    }
}

impl rootio_core::Object for StreamerInfo {
    fn class(&self) -> &str {
        "TStreamerInfo"
    }
}

impl rootio_core::Named for StreamerInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Unmarshal for StreamerInfo {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TStreamerInfo")?;
        let named = Named::unmarshal(r)?;
        let checksum = r.read_u32()?;
        let class_version = r.read_i32()?;

        let elements = match r.read_object_any()? {
            Some(Object::ObjArray(arr)) => arr
                .slots
                .into_iter()
                .flatten()
                .map(|obj| match obj {
                    Object::StreamerElement(e) => Ok(*e),
                    other => Err(Error::mismatch("streamer element", other.class())),
                })
                .collect::<Result<Vec<_>>>(),
            Some(other) => Err(Error::mismatch("TObjArray", other.class())),
            None => Ok(Vec::new()),
        };
        let elements = match elements {
            Ok(elements) => elements,
            Err(err) => return r.fail(err),
        };

        r.check_byte_count(&v, "TStreamerInfo")?;
        Ok(Self {
            name: named.name,
            title: named.title,
            checksum,
            class_version,
            elements,
        })
    }
}

impl Marshal for StreamerInfo {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        Named::new(self.name.clone(), self.title.clone()).marshal(w)?;
        w.write_u32(self.checksum);
        w.write_i32(self.class_version);
        let elements = ObjArray::new(self.elements.iter().cloned().map(Object::from));
        w.write_object_any(Some(&Object::ObjArray(elements)))?;
        w.set_byte_count(start, "TStreamerInfo")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rootio_core::Scalar;

    fn event() -> StreamerInfo {
        StreamerInfo::new(
            "Event",
            2,
            vec![
                StreamerElement::base("TObject", 1),
                StreamerElement::basic("n", Scalar::I32),
                StreamerElement::counted("x", Scalar::F32, "n", "Event"),
                StreamerElement::fixed_array("m", Scalar::F64, 4),
            ],
        )
    }

    #[test]
    fn test_checksum_idempotent() {
        let info = event();
        assert_eq!(info.checksum, info.compute_checksum());
        assert_eq!(event().checksum, info.checksum);

        let mut renamed = info.clone();
        renamed.elements[1].name = "count".into();
        assert_ne!(renamed.compute_checksum(), info.checksum);
    }

    #[test]
    fn test_checksum_known_value() {
        let info = StreamerInfo::new("A", 1, vec![StreamerElement::basic("b", Scalar::I32)]);
        // "A" = 65, then "int", then "b"
        let mut id = 65u32;
        for b in b"intb" {
            id = id * 3 + u32::from(*b);
        }
        assert_eq!(info.checksum, id);
    }

    #[test]
    fn test_roundtrip_through_object_reference() {
        let info = event();
        let mut w = WBuffer::new(0);
        w.write_object_any(Some(&Object::from(info.clone()))).unwrap();
        let bytes = w.into_bytes();

        let back = RBuffer::new(&bytes, 0).read_object_any().unwrap().unwrap();
        let back = StreamerInfo::try_from(back).unwrap();
        assert_eq!(back, info);
        assert_eq!(back.element("x").unwrap().class(), "TStreamerBasicPointer");
    }
}
