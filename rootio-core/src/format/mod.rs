//! Binary format definitions for the ROOT container
//!
//! Fixed-layout structures only: the file header, compression chunk headers,
//! packed date stamps and element type codes. Variable-length records (keys,
//! directories, streamers) are decoded by the codec in the I/O crate.

pub(crate) mod be;
pub mod chunk;
pub mod constants;
pub mod datime;
pub mod etype;
pub mod header;

pub use chunk::{Algorithm, ChunkHeader, Settings};
pub use datime::Datime;
pub use etype::{split_code, Scalar};
pub use header::{FileHeader, UUID_SIZE};
