//! Schemas synthesized for STL containers
//!
//! Files rarely carry descriptors for `vector<T>` and friends; their layout
//! follows from the template text alone.

use std::sync::Arc;

use rootio_core::format::constants::stl;
use rootio_core::CxxTemplate;

use super::element::StreamerElement;
use super::info::StreamerInfo;
use super::plan::{Codec, Plan};

/// Class version ROOT assigns to collection descriptors
const COLLECTION_VERSION: i32 = 6;

/// Whether `class` names a container whose schema can be synthesized
pub fn is_container(class: &str) -> bool {
    CxxTemplate::parse(class)
        .ok()
        .and_then(|t| t.stl_kind())
        .is_some_and(|kind| kind != stl::BITSET)
}

/// Single-member descriptor of a container class
pub fn container_info(class: &str) -> Option<StreamerInfo> {
    let template = CxxTemplate::parse(class).ok()?;
    let kind = template.stl_kind().filter(|k| *k != stl::BITSET)?;
    let content = match Codec::container(&template, true) {
        Codec::Sequence { elem, .. } => elem.content_type(),
        Codec::Map { value, .. } => value.content_type(),
        _ => return None,
    };
    Some(StreamerInfo::new(
        class,
        COLLECTION_VERSION,
        vec![StreamerElement::stl("This", class, kind, content)],
    ))
}

/// Compiled plan of a container class
pub fn container_plan(class: &str) -> Option<Plan> {
    let info = container_info(class)?;
    let template = CxxTemplate::parse(class).ok()?;
    let codec = Codec::container(&template, true);
    Some(Plan::container(Arc::new(info), codec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdict::{StreamerCatalog, Value};
    use crate::rbytes::{RBuffer, WBuffer};
    use rootio_core::format::etype::code;

    #[test]
    fn test_container_detection() {
        assert!(is_container("vector<float>"));
        assert!(is_container("std::map<int,string>"));
        assert!(!is_container("bitset<8>"));
        assert!(!is_container("Event"));
        assert!(!is_container("pair<int,float>"));
    }

    #[test]
    fn test_container_info() {
        let info = container_info("vector<double>").unwrap();
        assert_eq!(info.class_version, COLLECTION_VERSION);
        assert_eq!(info.elements.len(), 1);
        assert_eq!(info.elements[0].type_name, "vector<double>");
        assert_eq!(info.elements[0].kind, crate::rdict::ElementKind::Stl {
            stl_type: stl::VECTOR,
            content_type: code::DOUBLE,
        });
    }

    #[test]
    fn test_nested_vector_decode() {
        let mut w = WBuffer::new(0);
        let start = w.write_version(9);
        w.write_i32(2);
        w.write_i32(1);
        w.write_f32(0.5);
        w.write_i32(0);
        w.set_byte_count(start, "vector").unwrap();
        let bytes = w.into_bytes();

        let plan = Arc::new(container_plan("vector<vector<float> >").unwrap());
        let rec = plan
            .decode(&StreamerCatalog::new(), &mut RBuffer::new(&bytes, 0), None)
            .unwrap();
        assert_eq!(
            rec.get("This"),
            Some(&Value::Array(vec![
                Value::Array(vec![Value::F32(0.5)]),
                Value::Array(vec![]),
            ]))
        );
    }
}
