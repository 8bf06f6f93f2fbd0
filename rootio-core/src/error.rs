//! Error types for ROOT format definitions

/// Errors raised while interpreting fixed-layout format structures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// File does not start with the `root` magic
    BadMagic,
    /// Not enough bytes to decode the structure
    Truncated,
    /// Header fields are inconsistent
    InvalidHeader,
    /// Compression chunk header is malformed
    InvalidChunkHeader,
    /// Compression tag is not one the format defines
    UnknownAlgorithm([u8; 2]),
    /// Block exceeds the 24-bit size field
    BlockTooLarge,
    /// Byte range falls outside the source
    OutOfBounds,
    /// `name;cycle` string is malformed
    InvalidNameCycle,
    /// Leaf title such as `x[n]/F` is malformed
    InvalidLeafSpec,
    /// Template text such as `vector<int>` is malformed
    InvalidTemplate,
    /// Free segment with `first > last`
    InvalidSegment,
}

impl core::fmt::Display for FormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FormatError::BadMagic => write!(f, "not a ROOT file (bad magic)"),
            FormatError::Truncated => write!(f, "truncated structure"),
            FormatError::InvalidHeader => write!(f, "invalid file header"),
            FormatError::InvalidChunkHeader => write!(f, "invalid compression chunk header"),
            FormatError::UnknownAlgorithm(tag) => write!(
                f,
                "unknown compression algorithm {:?}",
                core::str::from_utf8(tag).unwrap_or("??")
            ),
            FormatError::BlockTooLarge => write!(f, "compression block exceeds 0xffffff bytes"),
            FormatError::OutOfBounds => write!(f, "byte range out of bounds"),
            FormatError::InvalidNameCycle => write!(f, "invalid name;cycle"),
            FormatError::InvalidLeafSpec => write!(f, "invalid leaf specification"),
            FormatError::InvalidTemplate => write!(f, "invalid template expression"),
            FormatError::InvalidSegment => write!(f, "invalid free segment"),
        }
    }
}

/// Result type for format operations
pub type Result<T> = core::result::Result<T, FormatError>;

impl core::error::Error for FormatError {}
