//! File header format definitions
//!
//! The header sits at offset 0 and occupies `begin` bytes. Pointer fields are
//! 32-bit for small files and 64-bit once the file grows past
//! [`START_BIG_FILE`](super::constants::START_BIG_FILE).

use super::be::{Reader, Writer};
use super::constants::{BIG_FILE_VERSION, BEGIN, FILE_VERSION, MAGIC, START_BIG_FILE};
use crate::{FormatError, Result};

/// Length of a stored UUID (16-bit version + 16 bytes)
pub const UUID_SIZE: usize = 18;

/// Decoded file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileHeader {
    /// Format version without the big-file offset
    pub version: i32,
    /// Offset of the first record
    pub begin: i64,
    /// First unused byte
    pub end: i64,
    /// Address of the free-segments record
    pub seek_free: i64,
    /// Size of the free-segments record
    pub nbytes_free: i32,
    /// Number of free segments
    pub nfree: i32,
    /// Size of the root directory's key header and name/title
    pub nbytes_name: i32,
    /// Pointer width in bytes (4 or 8)
    pub units: u8,
    /// Compression settings code (`algorithm * 100 + level`)
    pub compression: i32,
    /// Address of the streamer catalog record
    pub seek_info: i64,
    /// Size of the streamer catalog record
    pub nbytes_info: i32,
    /// UUID, including its 2-byte version prefix
    pub uuid: [u8; UUID_SIZE],
}

impl FileHeader {
    /// Magic bytes for ROOT files
    pub const MAGIC: [u8; 4] = MAGIC;

    /// Size of a header with 32-bit pointers
    pub const SMALL_SIZE: usize = 4 + 4 + 4 + 4 * 5 + 1 + 4 * 3 + UUID_SIZE;

    /// Size of a header with 64-bit pointers
    pub const BIG_SIZE: usize = Self::SMALL_SIZE + 3 * 4;

    /// Create a header for an empty file
    pub const fn new() -> Self {
        Self {
            version: FILE_VERSION,
            begin: BEGIN,
            end: BEGIN,
            seek_free: 0,
            nbytes_free: 0,
            nfree: 0,
            nbytes_name: 0,
            units: 4,
            compression: 101,
            seek_info: 0,
            nbytes_info: 0,
            uuid: [0; UUID_SIZE],
        }
    }

    /// Whether pointers are stored as 64-bit values
    pub const fn is_big(&self) -> bool {
        self.units == 8 || self.end > START_BIG_FILE
    }

    /// Validate the header structure
    pub fn is_valid(&self) -> bool {
        self.begin >= Self::SMALL_SIZE as i64
            && self.end >= self.begin
            && (self.units == 4 || self.units == 8)
            && (self.seek_free == 0 || self.seek_free >= self.begin)
            && (self.seek_info == 0 || self.seek_info >= self.begin)
    }

    /// Parse a header from the leading bytes of a file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        if r.array::<4>()? != Self::MAGIC {
            return Err(FormatError::BadMagic);
        }

        let mut version = r.i32()?;
        let begin = r.i32()? as i64;
        let big = version >= BIG_FILE_VERSION;
        if big {
            version -= BIG_FILE_VERSION;
        }

        let ptr = |r: &mut Reader<'_>| -> Result<i64> {
            if big {
                r.i64()
            } else {
                r.i32().map(i64::from)
            }
        };

        let end = ptr(&mut r)?;
        let seek_free = ptr(&mut r)?;
        let nbytes_free = r.i32()?;
        let nfree = r.i32()?;
        let nbytes_name = r.i32()?;
        let units = r.u8()?;
        let compression = r.i32()?;
        let seek_info = ptr(&mut r)?;
        let nbytes_info = r.i32()?;
        let uuid = r.array::<UUID_SIZE>()?;

        let header = Self {
            version,
            begin,
            end,
            seek_free,
            nbytes_free,
            nfree,
            nbytes_name,
            units,
            compression,
            seek_info,
            nbytes_info,
            uuid,
        };
        if !header.is_valid() {
            return Err(FormatError::InvalidHeader);
        }
        Ok(header)
    }

    /// Serialize into `out`, which must hold at least `begin` bytes
    ///
    /// Switches to 64-bit pointers and `units = 8` when the file is big.
    /// Returns the number of meaningful bytes; the rest of the area is zeroed.
    pub fn write_to(&self, out: &mut [u8]) -> Result<usize> {
        let area = self.begin as usize;
        if out.len() < area || area < Self::BIG_SIZE {
            return Err(FormatError::Truncated);
        }
        out[..area].fill(0);

        let big = self.is_big();
        let mut w = Writer::new(&mut out[..area]);
        w.bytes(&Self::MAGIC)?;
        w.i32(if big { self.version + BIG_FILE_VERSION } else { self.version })?;
        w.i32(self.begin as i32)?;

        let ptr = |w: &mut Writer<'_>, v: i64| -> Result<()> {
            if big {
                w.i64(v)
            } else {
                w.i32(v as i32)
            }
        };

        ptr(&mut w, self.end)?;
        ptr(&mut w, self.seek_free)?;
        w.i32(self.nbytes_free)?;
        w.i32(self.nfree)?;
        w.i32(self.nbytes_name)?;
        w.u8(if big { 8 } else { 4 })?;
        w.i32(self.compression)?;
        ptr(&mut w, self.seek_info)?;
        w.i32(self.nbytes_info)?;
        w.bytes(&self.uuid)?;
        Ok(w.pos())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileHeader {
        FileHeader {
            end: 4096,
            seek_free: 4000,
            nbytes_free: 60,
            nfree: 1,
            nbytes_name: 58,
            seek_info: 3000,
            nbytes_info: 900,
            ..FileHeader::new()
        }
    }

    #[test]
    fn test_small_header_roundtrip() {
        let header = sample();
        let mut buf = [0u8; 100];
        let n = header.write_to(&mut buf).unwrap();
        assert_eq!(n, FileHeader::SMALL_SIZE);
        assert_eq!(&buf[..4], b"root");
        assert_eq!(FileHeader::from_bytes(&buf).unwrap(), header);
    }

    #[test]
    fn test_big_header_roundtrip() {
        let header = FileHeader {
            end: START_BIG_FILE + 10,
            seek_free: START_BIG_FILE + 1,
            ..sample()
        };
        let mut buf = [0u8; 100];
        let n = header.write_to(&mut buf).unwrap();
        assert_eq!(n, FileHeader::BIG_SIZE);

        let raw_version = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(raw_version, header.version + BIG_FILE_VERSION);

        let back = FileHeader::from_bytes(&buf).unwrap();
        assert_eq!(back.units, 8);
        assert_eq!(back.end, header.end);
        assert_eq!(back.version, header.version);
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = [0u8; 100];
        sample().write_to(&mut buf).unwrap();
        buf[0] = b'R';
        assert_eq!(FileHeader::from_bytes(&buf), Err(FormatError::BadMagic));
    }

    #[test]
    fn test_truncated() {
        let mut buf = [0u8; 100];
        sample().write_to(&mut buf).unwrap();
        assert_eq!(FileHeader::from_bytes(&buf[..20]), Err(FormatError::Truncated));
    }
}
