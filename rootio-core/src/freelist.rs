//! Free-space bookkeeping
//!
//! A file tracks the byte ranges it does not use as a sorted list of
//! inclusive `[first, last]` segments. A fresh file starts with a single
//! segment covering everything past the header, so appending at the end and
//! reusing a hole are the same operation.

use alloc::vec::Vec;

use crate::format::be::{Reader, Writer};
use crate::format::constants::{
    BEGIN, BIG_RECORD_VERSION, FREE_SEGMENT_VERSION, START_BIG_FILE, TAIL_GROWTH,
};
use crate::{FormatError, Result};

/// One unused inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FreeSegment {
    pub first: i64,
    pub last: i64,
}

impl FreeSegment {
    pub const fn new(first: i64, last: i64) -> Self {
        Self { first, last }
    }

    /// Number of bytes in the segment
    pub const fn free(&self) -> i64 {
        self.last - self.first + 1
    }

    /// Whether the record needs 64-bit fields
    pub const fn is_big(&self) -> bool {
        self.last > START_BIG_FILE
    }

    /// Size of the serialized record
    pub const fn record_size(&self) -> usize {
        if self.is_big() {
            2 + 8 + 8
        } else {
            2 + 4 + 4
        }
    }

    /// Decode one record, returning it and the number of bytes consumed
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(bytes);
        let version = r.i16()?;
        let seg = if version > BIG_RECORD_VERSION {
            Self::new(r.i64()?, r.i64()?)
        } else {
            Self::new(r.i32()?.into(), r.i32()?.into())
        };
        if seg.first > seg.last {
            return Err(FormatError::InvalidSegment);
        }
        Ok((seg, seg.record_size_for(version)))
    }

    const fn record_size_for(&self, version: i16) -> usize {
        if version > BIG_RECORD_VERSION {
            18
        } else {
            10
        }
    }

    pub fn write_to(&self, out: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(out);
        if self.is_big() {
            w.i16(FREE_SEGMENT_VERSION + BIG_RECORD_VERSION)?;
            w.i64(self.first)?;
            w.i64(self.last)?;
        } else {
            w.i16(FREE_SEGMENT_VERSION)?;
            w.i32(self.first as i32)?;
            w.i32(self.last as i32)?;
        }
        Ok(w.pos())
    }
}

/// Placement decided by [`FreeList::allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Where the record starts
    pub seek: i64,
    /// Bytes left in a reused hole after the record; a gap marker of
    /// `-left` must be written right after it
    pub left: Option<i64>,
    /// New end of file when the record was appended at the tail
    pub end: Option<i64>,
}

/// Sorted, coalesced list of free segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeList {
    segments: Vec<FreeSegment>,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { segments: Vec::new() }
    }

    /// Free list of a freshly created file
    pub fn for_new_file() -> Self {
        let mut list = Self::new();
        list.segments.push(FreeSegment::new(BEGIN, START_BIG_FILE));
        list
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, FreeSegment> {
        self.segments.iter()
    }

    pub fn segments(&self) -> &[FreeSegment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&FreeSegment> {
        self.segments.last()
    }

    /// Mark `[first, last]` as free, merging with neighbours
    ///
    /// Returns the segment that now contains the range.
    pub fn add(&mut self, first: i64, last: i64) -> Result<FreeSegment> {
        if first > last {
            return Err(FormatError::InvalidSegment);
        }
        let seg = FreeSegment::new(first, last);
        let at = self.segments.partition_point(|s| *s < seg);
        self.segments.insert(at, seg);
        self.consolidate();
        self.find(seg).ok_or(FormatError::InvalidSegment)
    }

    fn find(&self, seg: FreeSegment) -> Option<FreeSegment> {
        self.segments
            .iter()
            .copied()
            .find(|cur| cur.first <= seg.first && seg.last <= cur.last)
    }

    /// Merge touching or overlapping neighbours, walking from the back
    pub fn consolidate(&mut self) {
        let mut i = self.segments.len();
        while i > 1 {
            i -= 1;
            let cur = self.segments[i];
            let prev = &mut self.segments[i - 1];
            if prev.last + 1 < cur.first {
                continue;
            }
            if cur.last > prev.last {
                prev.last = cur.last;
            }
            self.segments.remove(i);
        }
    }

    /// Index of the segment that should receive `nbytes`
    ///
    /// An exact fit wins, then the smallest segment leaving room for a gap
    /// marker (`free >= nbytes + 4`). Otherwise the last segment is extended
    /// by [`TAIL_GROWTH`] bytes and returned: the file is treated as
    /// indefinitely extensible.
    pub fn best(&mut self, nbytes: i64) -> Option<usize> {
        if self.segments.is_empty() {
            return None;
        }
        let mut fit: Option<usize> = None;
        for (i, cur) in self.segments.iter().enumerate() {
            let free = cur.free();
            if free == nbytes {
                return Some(i);
            }
            if free >= nbytes + 4 && fit.map_or(true, |j| free < self.segments[j].free()) {
                fit = Some(i);
            }
        }
        if fit.is_some() {
            return fit;
        }
        let i = self.segments.len() - 1;
        self.segments[i].last += TAIL_GROWTH;
        Some(i)
    }

    /// Reserve `nbytes` for a new record in a file currently ending at `end`
    pub fn allocate(&mut self, nbytes: i64, end: i64) -> Option<Allocation> {
        let i = self.best(nbytes)?;
        let seg = &mut self.segments[i];
        let seek = seg.first;

        if seek >= end {
            let new_end = seek + nbytes;
            seg.first = new_end;
            if new_end > seg.last {
                seg.last += TAIL_GROWTH;
            }
            return Some(Allocation { seek, left: None, end: Some(new_end) });
        }

        let left = seg.last - seek - nbytes + 1;
        if left == 0 {
            self.segments.remove(i);
            return Some(Allocation { seek, left: None, end: None });
        }
        seg.first = seek + nbytes;
        Some(Allocation { seek, left: Some(left), end: None })
    }

    /// Total size of the serialized records
    pub fn record_size(&self) -> usize {
        self.segments.iter().map(FreeSegment::record_size).sum()
    }

    /// Decode `count` consecutive records
    pub fn from_bytes(bytes: &[u8], count: usize) -> Result<Self> {
        let mut segments = Vec::with_capacity(count);
        let mut pos = 0;
        for _ in 0..count {
            let rest = bytes.get(pos..).ok_or(FormatError::Truncated)?;
            let (seg, n) = FreeSegment::from_bytes(rest)?;
            segments.push(seg);
            pos += n;
        }
        let mut list = Self { segments };
        list.segments.sort_unstable();
        list.consolidate();
        Ok(list)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = alloc::vec![0u8; self.record_size()];
        let mut pos = 0;
        for seg in &self.segments {
            pos += seg.write_to(&mut out[pos..])?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_file_list() {
        let list = FreeList::for_new_file();
        assert_eq!(list.segments(), &[FreeSegment::new(BEGIN, START_BIG_FILE)]);
    }

    #[test]
    fn test_add_merges_adjacent() {
        let mut list = FreeList::new();
        list.add(10, 19).unwrap();
        list.add(30, 39).unwrap();
        let merged = list.add(20, 29).unwrap();
        assert_eq!(merged, FreeSegment::new(10, 39));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_add_rejects_inverted() {
        let mut list = FreeList::new();
        assert_eq!(list.add(5, 4), Err(FormatError::InvalidSegment));
    }

    #[test]
    fn test_best_prefers_exact_then_smallest() {
        let mut list = FreeList::new();
        list.add(100, 199).unwrap(); // 100 bytes
        list.add(300, 319).unwrap(); // 20 bytes
        list.add(400, 449).unwrap(); // 50 bytes
        assert_eq!(list.best(20), Some(1));
        assert_eq!(list.best(30), Some(2));
        // 47 needs 51 bytes of room, only the 100-byte segment has it
        assert_eq!(list.best(47), Some(0));
    }

    #[test]
    fn test_best_grows_tail() {
        let mut list = FreeList::new();
        list.add(100, 109).unwrap();
        let i = list.best(1000).unwrap();
        assert_eq!(i, 0);
        assert_eq!(list.segments()[0].last, 109 + TAIL_GROWTH);
    }

    #[test]
    fn test_allocate_at_tail() {
        let mut list = FreeList::for_new_file();
        let a = list.allocate(64, BEGIN).unwrap();
        assert_eq!(a, Allocation { seek: BEGIN, left: None, end: Some(BEGIN + 64) });
        assert_eq!(list.segments()[0].first, BEGIN + 64);
    }

    #[test]
    fn test_allocate_in_hole() {
        let mut list = FreeList::for_new_file();
        list.allocate(1000, BEGIN).unwrap();
        list.add(200, 299).unwrap();

        let a = list.allocate(40, BEGIN + 1000).unwrap();
        assert_eq!(a, Allocation { seek: 200, left: Some(60), end: None });
        assert_eq!(list.segments()[0], FreeSegment::new(240, 299));

        let b = list.allocate(60, BEGIN + 1000).unwrap();
        assert_eq!(b, Allocation { seek: 240, left: None, end: None });
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_record_roundtrip() {
        let mut list = FreeList::new();
        list.add(100, 200).unwrap();
        list.add(START_BIG_FILE + 5, START_BIG_FILE + 50).unwrap();
        let bytes = list.to_bytes().unwrap();
        assert_eq!(bytes.len(), 10 + 18);
        assert_eq!(FreeList::from_bytes(&bytes, 2).unwrap(), list);
    }

    proptest! {
        #[test]
        fn prop_sorted_and_disjoint(ranges in proptest::collection::vec((0i64..10_000, 0i64..64), 1..64)) {
            let mut list = FreeList::new();
            for (first, len) in &ranges {
                list.add(*first, first + len).unwrap();
            }
            for pair in list.segments().windows(2) {
                // non-overlapping and never touching
                prop_assert!(pair[0].last + 1 < pair[1].first);
            }
            for (first, len) in &ranges {
                let covered = list.iter().any(|s| s.first <= *first && first + len <= s.last);
                prop_assert!(covered);
            }
        }
    }
}
