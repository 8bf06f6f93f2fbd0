//! Trees: columnar entries split over branches, leaves and baskets
//!
//! A [`Tree`] is an ordinary keyed object holding branch metadata. Entry
//! data lives in [`Basket`] records, one key each, located through the
//! branch's `basket_seek`/`basket_bytes` tables. Reading goes through a
//! [`Scanner`]; writing through a [`TreeWriter`].

mod basket;
mod branch;
mod leaf;
mod scanner;
mod tree;
mod writer;

pub use basket::Basket;
pub use branch::{AnyBranch, Branch, BranchElement};
pub use leaf::{Leaf, LeafExtra, LeafValue};
pub use scanner::{ScanEntry, Scanner};
pub use tree::Tree;
pub use writer::TreeWriter;

use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rtypes::{ObjArray, ObjectHeader};
use crate::Result;

/// `ROOT::TIOFeatures`: bit set of optional I/O behaviours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoFeatures(pub u8);

impl IoFeatures {
    pub const VERSION: i16 = 1;
}

impl rootio_core::Object for IoFeatures {
    fn class(&self) -> &str {
        "ROOT::TIOFeatures"
    }
}

impl Unmarshal for IoFeatures {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("ROOT::TIOFeatures")?;
        let mut bits = 0;
        if r.read_u8()? != 0 {
            r.skip(3)?;
            bits = r.read_u8()?;
        }
        r.check_byte_count(&v, "ROOT::TIOFeatures")?;
        Ok(Self(bits))
    }
}

impl Marshal for IoFeatures {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(Self::VERSION);
        if self.0 != 0 {
            w.write_bytes(&[0x1a, 0xa1, 0x2f, 0x10]);
        }
        w.write_u8(self.0);
        w.set_byte_count(start, "ROOT::TIOFeatures")
    }
}

/// Write `items` as an unnamed `TObjArray`
pub(crate) fn write_obj_array(w: &mut WBuffer, items: &[&dyn Marshal]) -> Result<()> {
    let start = w.write_version(ObjArray::VERSION);
    ObjectHeader::default().marshal(w)?;
    w.write_string("");
    w.write_i32(items.len() as i32);
    w.write_i32(0);
    for item in items {
        w.write_object_any(Some(*item))?;
    }
    w.set_byte_count(start, "TObjArray")
}

/// Read a `TObjArray` and convert every filled slot
pub(crate) fn read_obj_array<T>(r: &mut RBuffer<'_>) -> Result<Vec<T>>
where
    T: TryFrom<crate::rtypes::Object, Error = crate::Error>,
{
    ObjArray::unmarshal(r)?
        .slots
        .into_iter()
        .flatten()
        .map(T::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_features() {
        for bits in [0u8, 5] {
            let mut w = WBuffer::new(0);
            IoFeatures(bits).marshal(&mut w).unwrap();
            let bytes = w.into_bytes();
            assert_eq!(bytes.len(), if bits == 0 { 7 } else { 11 });
            let mut r = RBuffer::new(&bytes, 0);
            assert_eq!(IoFeatures::unmarshal(&mut r).unwrap(), IoFeatures(bits));
            assert!(r.is_empty());
        }
    }
}
