//! Byte source abstraction
//!
//! A minimal interface over the raw bytes of a file, regardless of whether
//! they live in a memory map, an owned buffer or a borrowed slice.

use crate::validation::check_span;
use crate::Result;

/// Random-access view over the bytes of a file
pub trait ByteSource {
    /// Get a slice of the underlying data
    fn as_slice(&self) -> &[u8];

    /// Total number of bytes available
    fn size(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// Borrow `len` bytes starting at `offset`, validating the range
    fn read_span(&self, offset: i64, len: i64) -> Result<&[u8]> {
        let (beg, end) = check_span(offset, len, self.size())?;
        Ok(&self.as_slice()[beg..end])
    }
}

impl ByteSource for [u8] {
    fn as_slice(&self) -> &[u8] {
        self
    }
}

#[cfg(feature = "alloc")]
impl ByteSource for alloc::vec::Vec<u8> {
    fn as_slice(&self) -> &[u8] {
        self
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn as_slice(&self) -> &[u8] {
        (**self).as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatError;

    #[test]
    fn test_read_span() {
        let data: &[u8] = b"rootdata";
        assert_eq!(data.read_span(4, 4), Ok(&b"data"[..]));
        assert_eq!(data.read_span(6, 4), Err(FormatError::OutOfBounds));
        assert_eq!(data.size(), 8);
    }
}
