use proptest::prelude::*;
use rootio::rbytes::{RBuffer, WBuffer};
use rootio::rtree::{Leaf, LeafExtra};
use rootio::rtypes::Named;
use rootio::{Error, Object, Value};

fn count_leaf() -> Leaf {
    Leaf {
        class: "TLeafI".into(),
        named: Named::new("n", "n"),
        len: 1,
        len_type: 4,
        offset: 0,
        is_range: false,
        is_unsigned: false,
        count: None,
        extra: LeafExtra::Range {
            minimum: Value::I32(0),
            maximum: Value::I32(8),
        },
    }
}

#[test]
fn test_alias_decodes_equal() {
    let leaf = count_leaf();
    let mut w = WBuffer::new(64);
    w.write_object_any(Some(&leaf)).unwrap();
    let after_first = w.len();
    w.write_object_any(Some(&leaf)).unwrap();
    let bytes = w.into_bytes();
    // the alias is a bare 4-byte tag
    assert_eq!(bytes.len(), after_first + 4);

    let mut r = RBuffer::new(&bytes, 64);
    let first = r.read_object_any().unwrap().unwrap();
    let second = r.read_object_any().unwrap().unwrap();
    assert_eq!(first, second);
    assert!(matches!(&first, Object::Leaf(l) if l.name() == "n" && l.maximum() == Some(8)));
    assert!(r.is_empty());
}

#[test]
fn test_unknown_back_reference_is_skipped() {
    let mut w = WBuffer::new(0);
    // byte count of 4, then an object tag nothing registered
    w.write_u32(4 | 0x4000_0000);
    w.write_u32(1234);
    w.write_i32(77);
    let bytes = w.into_bytes();

    let mut r = RBuffer::new(&bytes, 0);
    assert!(r.read_object_any().unwrap().is_none());
    assert_eq!(r.read_i32().unwrap(), 77);
}

#[test]
fn test_unknown_class_reference_poisons_buffer() {
    let mut w = WBuffer::new(0);
    w.write_u32(4 | 0x4000_0000);
    w.write_u32(0x8000_0000 | 90);
    w.write_i32(77);
    let bytes = w.into_bytes();

    let mut r = RBuffer::new(&bytes, 0);
    let err = r.read_object_any().unwrap_err();
    assert!(err.is_corruption());
    assert!(matches!(r.read_i32(), Err(Error::StructuralCorruption { .. })));
}

proptest! {
    #[test]
    fn prop_strings_roundtrip(s in "\\PC{0,400}") {
        let mut w = WBuffer::new(0);
        w.write_string(&s);
        w.write_i16(-5);
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        prop_assert_eq!(r.read_string().unwrap(), s);
        prop_assert_eq!(r.read_i16().unwrap(), -5);
    }

    #[test]
    fn prop_scalars_roundtrip(a in any::<i64>(), b in any::<u32>(), c in any::<f64>(), d in any::<i8>()) {
        let mut w = WBuffer::new(0);
        w.write_i64(a);
        w.write_u32(b);
        w.write_f64(c);
        w.write_i8(d);
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        prop_assert_eq!(r.read_i64().unwrap(), a);
        prop_assert_eq!(r.read_u32().unwrap(), b);
        let back = r.read_f64().unwrap();
        prop_assert!(back == c || (back.is_nan() && c.is_nan()));
        prop_assert_eq!(r.read_i8().unwrap(), d);
    }
}
