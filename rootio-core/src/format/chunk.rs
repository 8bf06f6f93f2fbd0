//! Compression chunk header and settings code
//!
//! Every compressed block starts with a 9-byte header: a 2-letter algorithm
//! tag, a method byte, then the compressed and uncompressed sizes as 3-byte
//! little-endian integers.

use super::constants::{CHUNK_HEADER_SIZE, MAX_BLOCK_SIZE};
use crate::{FormatError, Result};

/// Block compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Algorithm {
    /// Stored uncompressed
    None,
    Zlib,
    Lzma,
    /// Legacy ROOT algorithm, recognized but not supported
    Old,
    Lz4,
    Zstd,
}

impl Algorithm {
    /// Numeric code used in the settings value (`code * 100 + level`)
    pub const fn code(self) -> i32 {
        match self {
            Algorithm::None => 0,
            Algorithm::Zlib => 1,
            Algorithm::Lzma => 2,
            Algorithm::Old => 3,
            Algorithm::Lz4 => 4,
            Algorithm::Zstd => 5,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Algorithm::None,
            1 => Algorithm::Zlib,
            2 => Algorithm::Lzma,
            3 => Algorithm::Old,
            4 => Algorithm::Lz4,
            5 => Algorithm::Zstd,
            _ => return None,
        })
    }

    /// Two-letter tag written in the chunk header
    pub const fn tag(self) -> Option<[u8; 2]> {
        match self {
            Algorithm::None => None,
            Algorithm::Zlib => Some(*b"ZL"),
            Algorithm::Lzma => Some(*b"XZ"),
            Algorithm::Old => Some(*b"CS"),
            Algorithm::Lz4 => Some(*b"L4"),
            Algorithm::Zstd => Some(*b"ZS"),
        }
    }

    pub const fn from_tag(tag: [u8; 2]) -> Result<Self> {
        match &tag {
            b"ZL" => Ok(Algorithm::Zlib),
            b"XZ" => Ok(Algorithm::Lzma),
            b"CS" => Ok(Algorithm::Old),
            b"L4" => Ok(Algorithm::Lz4),
            b"ZS" => Ok(Algorithm::Zstd),
            _ => Err(FormatError::UnknownAlgorithm(tag)),
        }
    }

    /// Method byte written after the tag
    pub const fn method(self) -> u8 {
        match self {
            Algorithm::Zlib => 8,
            Algorithm::Lz4 | Algorithm::Zstd => 1,
            Algorithm::None | Algorithm::Lzma | Algorithm::Old => 0,
        }
    }
}

/// Compression settings: an algorithm and a level in `0..=99`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    pub algorithm: Algorithm,
    pub level: u8,
}

impl Settings {
    /// Uncompressed storage
    pub const NONE: Settings = Settings { algorithm: Algorithm::None, level: 0 };

    pub const fn new(algorithm: Algorithm, level: u8) -> Self {
        let level = if level > 99 { 99 } else { level };
        Self { algorithm, level }
    }

    /// Decode a settings code. Codes below 100 use zlib.
    pub const fn from_code(code: i32) -> Self {
        if code <= 0 {
            return Self::NONE;
        }
        let level = (code % 100) as u8;
        let algorithm = match Algorithm::from_code(code / 100) {
            Some(Algorithm::None) => Algorithm::Zlib,
            Some(alg) => alg,
            None => return Self::NONE,
        };
        Self { algorithm, level }
    }

    pub const fn code(self) -> i32 {
        match self.algorithm {
            Algorithm::None => 0,
            alg => alg.code() * 100 + self.level as i32,
        }
    }

    /// Whether payloads are stored as-is
    pub const fn is_none(self) -> bool {
        matches!(self.algorithm, Algorithm::None) || self.level == 0
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new(Algorithm::Zlib, 1)
    }
}

/// Header preceding one compressed block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub algorithm: Algorithm,
    pub method: u8,
    /// Size of the compressed bytes following the header
    pub compressed: u32,
    /// Size of the block once inflated
    pub uncompressed: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = CHUNK_HEADER_SIZE;

    pub fn new(algorithm: Algorithm, compressed: usize, uncompressed: usize) -> Result<Self> {
        if compressed > MAX_BLOCK_SIZE || uncompressed > MAX_BLOCK_SIZE {
            return Err(FormatError::BlockTooLarge);
        }
        Ok(Self {
            algorithm,
            method: algorithm.method(),
            compressed: compressed as u32,
            uncompressed: uncompressed as u32,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(FormatError::Truncated);
        }
        let algorithm = Algorithm::from_tag([bytes[0], bytes[1]])?;
        let le24 = |b: &[u8]| u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16;
        Ok(Self {
            algorithm,
            method: bytes[2],
            compressed: le24(&bytes[3..6]),
            uncompressed: le24(&bytes[6..9]),
        })
    }

    pub fn to_bytes(&self) -> Result<[u8; CHUNK_HEADER_SIZE]> {
        let tag = self.algorithm.tag().ok_or(FormatError::InvalidChunkHeader)?;
        let c = self.compressed.to_le_bytes();
        let u = self.uncompressed.to_le_bytes();
        Ok([tag[0], tag[1], self.method, c[0], c[1], c[2], u[0], u[1], u[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_code() {
        assert_eq!(Settings::from_code(101), Settings::new(Algorithm::Zlib, 1));
        assert_eq!(Settings::from_code(404), Settings::new(Algorithm::Lz4, 4));
        assert_eq!(Settings::from_code(5), Settings::new(Algorithm::Zlib, 5));
        assert_eq!(Settings::from_code(0), Settings::NONE);
        assert_eq!(Settings::new(Algorithm::Lzma, 9).code(), 209);
        assert!(Settings::new(Algorithm::Zstd, 0).is_none());
    }

    #[test]
    fn test_chunk_header_layout() {
        let hdr = ChunkHeader::new(Algorithm::Zlib, 0x010203, 0x0a0b0c).unwrap();
        let bytes = hdr.to_bytes().unwrap();
        assert_eq!(bytes, [b'Z', b'L', 8, 0x03, 0x02, 0x01, 0x0c, 0x0b, 0x0a]);
        assert_eq!(ChunkHeader::from_bytes(&bytes).unwrap(), hdr);
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = [b'Q', b'Q', 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            ChunkHeader::from_bytes(&bytes),
            Err(FormatError::UnknownAlgorithm(*b"QQ"))
        );
    }

    #[test]
    fn test_block_limit() {
        assert_eq!(
            ChunkHeader::new(Algorithm::Lz4, MAX_BLOCK_SIZE + 1, 10),
            Err(FormatError::BlockTooLarge)
        );
    }
}
