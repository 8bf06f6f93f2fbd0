//! Byte sources and sinks behind a file
//!
//! Read-only files are memory-mapped when the `mmap` feature is on and the
//! config asks for it; writable files go through a plain handle.

use std::borrow::Cow;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[cfg(feature = "mmap")]
use memmap2::{Mmap, MmapOptions};
use rootio_core::ByteSource;

use crate::{Error, Result};

pub(crate) enum Storage {
    #[cfg(feature = "mmap")]
    Map(Mmap),
    Memory(Vec<u8>),
    Disk { file: fs::File, len: u64, writable: bool },
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            #[cfg(feature = "mmap")]
            Storage::Map(_) => "mmap",
            Storage::Memory(_) => "memory",
            Storage::Disk { .. } => "disk",
        };
        f.debug_struct("Storage")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

impl Storage {
    /// Open an existing file for reading
    pub(crate) fn open(path: &Path, mmap: bool) -> Result<Self> {
        let file = fs::File::open(path)?;
        #[cfg(feature = "mmap")]
        {
            if mmap {
                // SAFETY: read-only mapping; the file is not written through
                // this process while mapped
                let map = unsafe { MmapOptions::new().map(&file)? };
                return Ok(Storage::Map(map));
            }
        }
        #[cfg(not(feature = "mmap"))]
        let _ = mmap;
        let len = file.metadata()?.len();
        Ok(Storage::Disk {
            file,
            len,
            writable: false,
        })
    }

    /// Create or truncate a file for writing
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Storage::Disk {
            file,
            len: 0,
            writable: true,
        })
    }

    pub(crate) fn len(&self) -> u64 {
        match self {
            #[cfg(feature = "mmap")]
            Storage::Map(map) => map[..].size(),
            Storage::Memory(bytes) => bytes.size(),
            Storage::Disk { len, .. } => *len,
        }
    }

    pub(crate) fn is_writable(&self) -> bool {
        matches!(self, Storage::Disk { writable: true, .. })
    }

    /// Borrow or read `len` bytes at `offset`
    pub(crate) fn read_at(&self, offset: i64, len: i64) -> Result<Cow<'_, [u8]>> {
        match self {
            #[cfg(feature = "mmap")]
            Storage::Map(map) => Ok(Cow::Borrowed(map[..].read_span(offset, len)?)),
            Storage::Memory(bytes) => Ok(Cow::Borrowed(bytes.read_span(offset, len)?)),
            Storage::Disk { file, len: size, .. } => {
                let (beg, end) = rootio_core::check_span(offset, len, *size)?;
                let mut buf = vec![0u8; end - beg];
                let mut file = file;
                file.seek(SeekFrom::Start(beg as u64))?;
                file.read_exact(&mut buf)?;
                Ok(Cow::Owned(buf))
            }
        }
    }

    /// Write `bytes` at `offset`, growing the file as needed
    pub(crate) fn write_at(&mut self, offset: i64, bytes: &[u8]) -> Result<()> {
        match self {
            Storage::Disk {
                file,
                len,
                writable: true,
            } => {
                let offset = u64::try_from(offset)
                    .map_err(|_| Error::InvalidArgument(format!("negative write offset {offset}")))?;
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(bytes)?;
                *len = (*len).max(offset + bytes.len() as u64);
                Ok(())
            }
            _ => Err(Error::ReadOnly),
        }
    }

    pub(crate) fn sync(&mut self) -> Result<()> {
        if let Storage::Disk {
            file, writable: true, ..
        } = self
        {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_is_read_only() {
        let mut storage = Storage::Memory(b"rootdata".to_vec());
        assert_eq!(&*storage.read_at(4, 4).unwrap(), b"data");
        assert!(storage.read_at(6, 4).unwrap_err().is_corruption());
        assert!(matches!(storage.write_at(0, b"x"), Err(Error::ReadOnly)));
        assert!(!storage.is_writable());
    }

    #[test]
    fn test_disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.root");
        let mut storage = Storage::create(&path).unwrap();
        storage.write_at(4, b"tail").unwrap();
        storage.write_at(0, b"head").unwrap();
        assert_eq!(storage.len(), 8);
        assert_eq!(&*storage.read_at(0, 8).unwrap(), b"headtail");
        storage.sync().unwrap();
        drop(storage);

        for mmap in [false, true] {
            let storage = Storage::open(&path, mmap).unwrap();
            assert_eq!(&*storage.read_at(2, 4).unwrap(), b"adta");
        }
    }
}
