//! Format constants and magic bytes

/// Magic bytes at offset 0 of every file
pub const MAGIC: [u8; 4] = *b"root";

/// Offset of the first record after the file header
pub const BEGIN: i64 = 100;

/// Files whose end pointer exceeds this use 64-bit pointers
pub const START_BIG_FILE: i64 = 2_000_000_000;

/// Added to the on-disk file version when pointers are 64-bit
pub const BIG_FILE_VERSION: i32 = 1_000_000;

/// Added to key, directory and free-segment versions when pointers are 64-bit
pub const BIG_RECORD_VERSION: i16 = 1000;

/// Version written by this crate for the file header
pub const FILE_VERSION: i32 = 62206;

/// Version written for key headers
pub const KEY_VERSION: i16 = 4;

/// Version written for directory records
pub const DIRECTORY_VERSION: i16 = 5;

/// Version written for free-segment records
pub const FREE_SEGMENT_VERSION: i16 = 1;

/// Amount the tail segment grows when no free segment fits
pub const TAIL_GROWTH: i64 = 1_000_000_000;

/// Records shorter than this are never compressed
pub const MIN_COMPRESS_SIZE: usize = 512;

/// Largest block a single compression chunk may hold
pub const MAX_BLOCK_SIZE: usize = 0xff_ffff;

/// Size of the per-chunk compression header
pub const CHUNK_HEADER_SIZE: usize = 9;

/// Byte-count and back-reference tag bits
pub mod tags {
    /// Set in a 32-bit byte count word
    pub const BYTE_COUNT_MASK: u32 = 0x4000_0000;
    /// Set in the high 16 bits of a byte count word read as a version
    pub const BYTE_COUNT_VMASK: u16 = 0x4000;
    /// Tag announcing an inline class name
    pub const NEW_CLASS_TAG: u32 = 0xffff_ffff;
    /// Set in tags that reference a class rather than an object
    pub const CLASS_MASK: u32 = 0x8000_0000;
    /// Offset added to buffer positions before they become reference tags
    pub const MAP_OFFSET: u64 = 2;
    /// `TObject` bit set when the object was referenced by a `TRef`
    pub const IS_REFERENCED: u32 = 1 << 4;
    /// `TObject` bit for heap allocated objects, stripped on write
    pub const IS_ON_HEAP: u32 = 0x0100_0000;
    /// `TObject` liveness bit, stripped on write
    pub const NOT_DELETED: u32 = 0x0200_0000;
}

/// STL container kinds carried by `TStreamerSTL`
pub mod stl {
    pub const VECTOR: i32 = 1;
    pub const LIST: i32 = 2;
    pub const DEQUE: i32 = 3;
    pub const MAP: i32 = 4;
    pub const MULTIMAP: i32 = 5;
    pub const SET: i32 = 6;
    pub const MULTISET: i32 = 7;
    pub const BITSET: i32 = 8;
}
