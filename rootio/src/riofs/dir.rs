//! Directories: ordered keys plus nested subdirectories

use rootio_core::format::constants::{BIG_RECORD_VERSION, DIRECTORY_VERSION};
use rootio_core::{parse_namecycle, UUID_SIZE};

use super::file::FileIo;
use super::key::Key;
use super::File;
use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rtypes::Object;
use crate::{Error, Result};

/// Classes whose keys hold a subdirectory
pub(crate) fn is_dir_class(class: &str) -> bool {
    matches!(class, "TDirectory" | "TDirectoryFile")
}

/// Fixed part of a directory as stored on disk
///
/// Small records are padded so both layouts take [`DirectoryRecord::SIZE`]
/// bytes and a record can switch to 64-bit pointers in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub version: i16,
    pub ctime: u32,
    pub mtime: u32,
    pub nbytes_keys: i32,
    pub nbytes_name: i32,
    pub seek_dir: i64,
    pub seek_parent: i64,
    pub seek_keys: i64,
    pub uuid: [u8; UUID_SIZE],
}

impl DirectoryRecord {
    /// Bytes reserved on disk for a record
    pub const SIZE: usize = 60;

    pub(crate) fn new(datime: u32, big: bool) -> Self {
        let mut uuid = [0u8; UUID_SIZE];
        uuid[1] = 1;
        Self {
            version: if big { DIRECTORY_VERSION + BIG_RECORD_VERSION } else { DIRECTORY_VERSION },
            ctime: datime,
            mtime: datime,
            nbytes_keys: 0,
            nbytes_name: 0,
            seek_dir: 0,
            seek_parent: 0,
            seek_keys: 0,
            uuid,
        }
    }

    pub fn is_big(&self) -> bool {
        self.version > BIG_RECORD_VERSION
    }

    pub(crate) fn set_big(&mut self, big: bool) {
        let base = self.version % BIG_RECORD_VERSION;
        self.version = if big { base + BIG_RECORD_VERSION } else { base };
    }

    /// Check that every pointer lands before `end`
    pub(crate) fn check_bounds(&self, end: i64) -> Result<()> {
        let keys_end = self.seek_keys.checked_add(i64::from(self.nbytes_keys));
        let inside = self.seek_dir < end
            && self.seek_parent < end
            && keys_end.is_some_and(|e| self.seek_keys == 0 || e <= end);
        if !inside {
            return Err(Error::corrupt(
                "TDirectory",
                format!(
                    "pointers dir={} parent={} keys={}+{} past the end of the file at {end}",
                    self.seek_dir, self.seek_parent, self.seek_keys, self.nbytes_keys
                ),
            ));
        }
        Ok(())
    }
}

impl rootio_core::Object for DirectoryRecord {
    fn class(&self) -> &str {
        "TDirectory"
    }
}

impl Unmarshal for DirectoryRecord {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let at = r.pos();
        let version = r.read_i16()?;
        let base = version % BIG_RECORD_VERSION;
        if !(0..2 * BIG_RECORD_VERSION).contains(&version) || !(1..=DIRECTORY_VERSION).contains(&base) {
            return r.fail(Error::corrupt("TDirectory", format!("unknown version {version} at {at}")));
        }
        let ctime = r.read_u32()?;
        let mtime = r.read_u32()?;
        let nbytes_keys = r.read_i32()?;
        let nbytes_name = r.read_i32()?;
        let big = version > BIG_RECORD_VERSION;
        let mut ptr = || -> Result<i64> {
            if big {
                r.read_i64()
            } else {
                r.read_i32().map(i64::from)
            }
        };
        let seek_dir = ptr()?;
        let seek_parent = ptr()?;
        let seek_keys = ptr()?;
        if seek_dir < 0 || seek_parent < 0 || seek_keys < 0 || nbytes_keys < 0 || nbytes_name < 0 {
            return r.fail(Error::corrupt(
                "TDirectory",
                format!("negative pointer or size in the record at {at}"),
            ));
        }
        let mut uuid = [0u8; UUID_SIZE];
        uuid.copy_from_slice(r.read_bytes(UUID_SIZE)?);
        Ok(Self {
            version,
            ctime,
            mtime,
            nbytes_keys,
            nbytes_name,
            seek_dir,
            seek_parent,
            seek_keys,
            uuid,
        })
    }
}

impl Marshal for DirectoryRecord {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.len();
        w.write_i16(self.version);
        w.write_u32(self.ctime);
        w.write_u32(self.mtime);
        w.write_i32(self.nbytes_keys);
        w.write_i32(self.nbytes_name);
        if self.is_big() {
            w.write_i64(self.seek_dir);
            w.write_i64(self.seek_parent);
            w.write_i64(self.seek_keys);
        } else {
            w.write_i32(self.seek_dir as i32);
            w.write_i32(self.seek_parent as i32);
            w.write_i32(self.seek_keys as i32);
        }
        w.write_bytes(&self.uuid);
        let pad = Self::SIZE - (w.len() - start);
        w.write_bytes(&[0u8; 12][..pad]);
        Ok(())
    }
}

/// In-memory state of one directory
#[derive(Debug, Clone)]
pub(crate) struct DirNode {
    pub(crate) record: DirectoryRecord,
    /// Class written in the header of the keys list
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) title: String,
    pub(crate) keys: Vec<Key>,
    pub(crate) dirs: Vec<DirNode>,
    /// Why the directory could not be loaded; its content stays unknown
    pub(crate) error: Option<Error>,
}

impl DirNode {
    pub(crate) fn new(record: DirectoryRecord, class: &str, name: &str, title: &str) -> Self {
        Self {
            record,
            class: class.to_owned(),
            name: name.to_owned(),
            title: title.to_owned(),
            keys: Vec::new(),
            dirs: Vec::new(),
            error: None,
        }
    }

    /// Placeholder for a subdirectory whose record or keys are damaged
    pub(crate) fn broken(key: &Key, error: Error) -> Self {
        let record = DirectoryRecord {
            seek_dir: key.seek_key,
            ..DirectoryRecord::new(key.datime, key.is_big())
        };
        Self {
            error: Some(error),
            ..Self::new(record, &key.class, &key.name, &key.title)
        }
    }

    fn enter(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Index of the key selected by `name;cycle`, the highest cycle when
    /// none is given
    pub(crate) fn key_index(&self, namecycle: &str) -> Result<usize> {
        let (name, cycle) = parse_namecycle(namecycle)?;
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.name == name && cycle.map_or(true, |c| k.cycle == c))
            .max_by_key(|(_, k)| k.cycle)
            .map(|(i, _)| i)
            .ok_or_else(|| Error::KeyNotFound(namecycle.to_owned()))
    }

    pub(crate) fn key(&self, namecycle: &str) -> Result<&Key> {
        self.key_index(namecycle).map(|i| &self.keys[i])
    }

    pub(crate) fn next_cycle(&self, name: &str) -> Result<i16> {
        let last = self
            .keys
            .iter()
            .filter(|k| k.name == name)
            .map(|k| k.cycle)
            .max()
            .unwrap_or(0);
        last.checked_add(1)
            .ok_or_else(|| Error::InvalidArgument(format!("no cycle left for {name:?}")))
    }

    /// Directory at a `/`-separated path below this one
    pub(crate) fn walk(&self, path: &str) -> Result<&DirNode> {
        let mut node = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            node = node
                .dirs
                .iter()
                .find(|d| d.name == part)
                .ok_or_else(|| Error::KeyNotFound(path.to_owned()))?;
            node.enter()?;
        }
        Ok(node)
    }

    pub(crate) fn walk_mut(&mut self, path: &str) -> Result<&mut DirNode> {
        let mut node = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            node = node
                .dirs
                .iter_mut()
                .find(|d| d.name == part)
                .ok_or_else(|| Error::KeyNotFound(path.to_owned()))?;
            node.enter()?;
        }
        Ok(node)
    }
}

/// Split `a/b/name;cycle` into the directory path and the key selector
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(at) => (&path[..at], &path[at + 1..]),
        None => ("", path),
    }
}

/// Read access to one directory of an open file
#[derive(Debug, Clone, Copy)]
pub struct Directory<'f> {
    pub(crate) file: &'f File,
    pub(crate) node: &'f DirNode,
}

impl<'f> Directory<'f> {
    pub fn name(&self) -> &'f str {
        &self.node.name
    }

    pub fn title(&self) -> &'f str {
        &self.node.title
    }

    pub fn record(&self) -> &'f DirectoryRecord {
        &self.node.record
    }

    /// Keys in the order they were written
    pub fn keys(&self) -> &'f [Key] {
        &self.node.keys
    }

    /// Key selected by `name;cycle`
    pub fn key(&self, namecycle: &str) -> Result<&'f Key> {
        self.node.key(namecycle)
    }

    /// Decode the object at `a/b/name;cycle`, relative to this directory
    pub fn get(&self, path: &str) -> Result<Object> {
        let (dir, namecycle) = split_path(path);
        self.node.walk(dir)?.key(namecycle)?.object(self.file)
    }

    /// Subdirectory at a `/`-separated path
    pub fn dir(&self, path: &str) -> Result<Directory<'f>> {
        Ok(Directory {
            file: self.file,
            node: self.node.walk(path)?,
        })
    }

    /// Immediate subdirectories that could be loaded
    pub fn dirs(&self) -> impl Iterator<Item = Directory<'f>> + 'f {
        let file = self.file;
        self.node
            .dirs
            .iter()
            .filter(|node| node.error.is_none())
            .map(move |node| Directory { file, node })
    }
}

/// Write access to one directory of a writable file
#[derive(Debug)]
pub struct DirectoryMut<'f> {
    pub(crate) io: &'f mut FileIo,
    pub(crate) node: &'f mut DirNode,
}

impl DirectoryMut<'_> {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn keys(&self) -> &[Key] {
        &self.node.keys
    }

    /// Store `obj` under `name` with the next free cycle, which is returned
    pub fn put(&mut self, name: &str, obj: impl Into<Object>) -> Result<i16> {
        self.io.put(self.node, name, &obj.into())
    }

    /// Remove a key and free its bytes; directories are removed with their content
    pub fn delete(&mut self, namecycle: &str) -> Result<()> {
        self.io.delete(self.node, namecycle)
    }

    /// Create an immediate subdirectory
    pub fn mkdir(&mut self, name: &str) -> Result<DirectoryMut<'_>> {
        let at = self.io.mkdir(self.node, name)?;
        Ok(DirectoryMut {
            io: &mut *self.io,
            node: &mut self.node.dirs[at],
        })
    }

    /// Subdirectory at a `/`-separated path
    pub fn dir_mut(&mut self, path: &str) -> Result<DirectoryMut<'_>> {
        Ok(DirectoryMut {
            io: &mut *self.io,
            node: self.node.walk_mut(path)?,
        })
    }
}
