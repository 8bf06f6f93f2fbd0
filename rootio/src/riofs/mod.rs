//! File, directory and key layer
//!
//! A [`File`] owns the byte storage, the header, the free-space list and
//! the streamer catalog. Directories are views into the in-memory index
//! loaded at open; writes place new records immediately and the index is
//! persisted by [`File::close`].

mod dir;
mod file;
mod key;
mod storage;

pub use dir::{Directory, DirectoryMut, DirectoryRecord};
pub use file::File;
pub use key::Key;
