//! Opening, creating and closing files

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rootio_core::format::constants::{BEGIN, START_BIG_FILE};
use rootio_core::{validate_name, Datime, FileHeader, FreeList, UUID_SIZE};
use xxhash_rust::xxh64::xxh64;

use super::dir::{is_dir_class, split_path, DirNode, Directory, DirectoryMut, DirectoryRecord};
use super::key::{Key, KEY_PREFIX};
use super::storage::Storage;
use crate::config::FileConfig;
use crate::error::ResultExt;
use crate::rbytes::{string_size, Context, Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rcompress::compress;
use crate::rdict::{is_container, Record, StreamerCatalog, StreamerInfo, Value};
use crate::rtree::Tree;
use crate::rtypes::{ClassRegistry, List, Object};
use crate::{Error, Result};

/// Nesting limit when loading directories, against self-referencing files
const MAX_DEPTH: usize = 64;

/// State shared by every directory of a file
#[derive(Debug)]
pub(crate) struct FileIo {
    pub(crate) storage: Storage,
    pub(crate) header: FileHeader,
    pub(crate) free: FreeList,
    pub(crate) streamers: StreamerCatalog,
    pub(crate) registry: ClassRegistry,
    pub(crate) config: FileConfig,
    pub(crate) closed: bool,
}

impl FileIo {
    pub(crate) fn context(&self) -> Context<'_> {
        Context {
            registry: &self.registry,
            streamers: Some(&self.streamers),
        }
    }

    /// Packed date stamp for records written now
    pub(crate) fn datime(&self) -> u32 {
        self.config.datime.unwrap_or_else(|| {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            Datime::from_unix(secs).pack()
        })
    }

    /// Whether new records need 64-bit pointers
    pub(crate) fn big(&self) -> bool {
        self.header.end > START_BIG_FILE
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.storage.is_writable() {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Read the key header stored at `seek`
    pub(crate) fn read_key(&self, seek: i64) -> Result<Key> {
        let head = self.storage.read_at(seek, KEY_PREFIX as i64)?;
        let mut r = RBuffer::new(&head, seek as u64);
        r.skip(4 + 2 + 4 + 4)?;
        let keylen = r.read_i16()?;
        if (keylen as usize) < KEY_PREFIX {
            return Err(Error::corrupt("TKey", format!("key length {keylen} at {seek}")));
        }
        let data = self.storage.read_at(seek, i64::from(keylen))?;
        Key::read_record(&mut RBuffer::new(&data, seek as u64))
    }

    /// Reserve `nbytes`, then write the bytes `fill` produces for the chosen
    /// address and the free list as it will be after the reservation
    ///
    /// Nothing changes in memory unless the write succeeds.
    pub(crate) fn write_record(
        &mut self,
        nbytes: i64,
        fill: impl FnOnce(i64, &FreeList) -> Result<Vec<u8>>,
    ) -> Result<i64> {
        self.check_writable()?;
        let end = self.header.end;
        let mut free = self.free.clone();
        let alloc = free
            .allocate(nbytes, end)
            .ok_or_else(|| Error::corrupt("free list", "no free segment left"))?;
        let bytes = fill(alloc.seek, &free)?;
        if bytes.len() as i64 != nbytes {
            return Err(Error::corrupt(
                "record",
                format!("reserved {nbytes} bytes at {}, produced {}", alloc.seek, bytes.len()),
            ));
        }
        self.storage.write_at(alloc.seek, &bytes)?;

        let stop = alloc.seek + nbytes;
        if let Some(left) = alloc.left {
            if stop < end {
                let gap = -(left.min(i64::from(i32::MAX)) as i32);
                self.storage.write_at(stop, &gap.to_be_bytes())?;
            }
        }
        self.free = free;
        self.header.end = alloc.end.unwrap_or(end).max(stop);
        Ok(alloc.seek)
    }

    /// Mark a record's bytes as free
    pub(crate) fn free_record(&mut self, seek: i64, nbytes: i32) -> Result<()> {
        if seek <= 0 || nbytes <= 0 {
            return Ok(());
        }
        self.storage.write_at(seek, &(-nbytes).to_be_bytes())?;
        self.free.add(seek, seek + i64::from(nbytes) - 1)?;
        tracing::trace!(seek, nbytes, "freed record");
        Ok(())
    }

    /// Place `key` and its stored payload, updating the key's address and size
    pub(crate) fn write_key(&mut self, key: &mut Key, payload: &[u8]) -> Result<()> {
        let nbytes = i64::from(key.keylen) + payload.len() as i64;
        key.nbytes = i32::try_from(nbytes)
            .map_err(|_| Error::InvalidArgument(format!("record {:?} of {nbytes} bytes", key.name)))?;
        let seek = self.write_record(nbytes, |seek, _| {
            let mut w = WBuffer::new(seek as u64);
            let mut placed = key.clone();
            placed.seek_key = seek;
            placed.write(&mut w);
            w.write_bytes(payload);
            Ok(w.into_bytes())
        })?;
        key.seek_key = seek;
        Ok(())
    }

    /// Encode `obj` behind a key header of `keylen` bytes and compress it
    fn encode(&self, obj: &dyn Marshal, keylen: i16) -> Result<(Vec<u8>, i32)> {
        let mut w = WBuffer::new(keylen as u64);
        obj.marshal(&mut w)?;
        let raw = w.into_bytes();
        let objlen = i32::try_from(raw.len())
            .map_err(|_| Error::InvalidArgument(format!("object of {} bytes", raw.len())))?;
        let stored = compress(self.config.settings, &raw)?.into_owned();
        Ok((stored, objlen))
    }

    pub(crate) fn put(&mut self, node: &mut DirNode, name: &str, obj: &Object) -> Result<i16> {
        self.check_writable()?;
        validate_name(name)?;
        let mut streamers = self.streamers.clone();
        register_streamers(&mut streamers, obj)?;

        let cycle = node.next_cycle(name)?;
        let title = obj.title().unwrap_or_default();
        let mut key = Key::new(
            obj.class(),
            name,
            title,
            cycle,
            self.datime(),
            node.record.seek_dir,
            self.big(),
        )?;
        let (payload, objlen) = self.encode(obj, key.keylen).context(|| format!("key {name:?}"))?;
        key.objlen = objlen;
        self.write_key(&mut key, &payload)?;

        tracing::debug!(
            name,
            cycle,
            class = %key.class,
            seek = key.seek_key,
            nbytes = key.nbytes,
            objlen,
            "put key"
        );
        self.streamers = streamers;
        node.record.mtime = key.datime;
        node.keys.push(key);
        Ok(cycle)
    }

    pub(crate) fn mkdir(&mut self, node: &mut DirNode, name: &str) -> Result<usize> {
        self.check_writable()?;
        validate_name(name)?;
        if node.dirs.iter().any(|d| d.name == name) {
            return Err(Error::InvalidArgument(format!("directory {name:?} already exists")));
        }
        let big = self.big();
        let datime = self.datime();
        let cycle = node.next_cycle(name)?;
        let mut key = Key::new("TDirectory", name, "", cycle, datime, node.record.seek_dir, big)?;
        key.objlen = DirectoryRecord::SIZE as i32;
        key.nbytes = i32::from(key.keylen) + key.objlen;

        let mut record = DirectoryRecord::new(datime, big);
        record.nbytes_name = i32::from(key.keylen);
        record.seek_parent = node.record.seek_dir;

        let seek = self.write_record(i64::from(key.nbytes), |seek, _| {
            let mut w = WBuffer::new(seek as u64);
            let mut placed = key.clone();
            placed.seek_key = seek;
            placed.write(&mut w);
            DirectoryRecord {
                seek_dir: seek,
                ..record.clone()
            }
            .marshal(&mut w)?;
            Ok(w.into_bytes())
        })?;
        key.seek_key = seek;
        record.seek_dir = seek;

        tracing::debug!(name, seek, "created directory");
        node.record.mtime = datime;
        node.keys.push(key);
        node.dirs.push(DirNode::new(record, "TDirectory", name, ""));
        Ok(node.dirs.len() - 1)
    }

    pub(crate) fn delete(&mut self, node: &mut DirNode, namecycle: &str) -> Result<()> {
        self.check_writable()?;
        let at = node.key_index(namecycle)?;
        let (seek, nbytes) = (node.keys[at].seek_key, node.keys[at].nbytes);

        let sub = if is_dir_class(&node.keys[at].class) {
            node.dirs
                .iter()
                .position(|d| d.record.seek_dir == seek)
        } else {
            None
        };
        if let Some(i) = sub {
            self.free_tree(&node.dirs[i])?;
            node.dirs.remove(i);
        }
        self.free_record(seek, nbytes)?;
        let key = node.keys.remove(at);
        node.record.mtime = self.datime();
        tracing::debug!(name = %key.name, cycle = key.cycle, seek, nbytes, "deleted key");
        Ok(())
    }

    /// Free every record owned by a directory
    fn free_tree(&mut self, node: &DirNode) -> Result<()> {
        for sub in &node.dirs {
            self.free_tree(sub)?;
        }
        for key in node.keys.iter().filter(|k| !is_dir_class(&k.class)) {
            self.free_record(key.seek_key, key.nbytes)?;
        }
        for key in node.keys.iter().filter(|k| is_dir_class(&k.class)) {
            self.free_record(key.seek_key, key.nbytes)?;
        }
        self.free_record(node.record.seek_keys, node.record.nbytes_keys)
    }

    /// Write the keys list of `node` and its subdirectories, then rewrite
    /// each directory record in place
    pub(crate) fn save_dir(&mut self, node: &mut DirNode) -> Result<()> {
        for sub in node.dirs.iter_mut().filter(|d| d.error.is_none()) {
            self.save_dir(sub)?;
        }
        self.free_record(node.record.seek_keys, node.record.nbytes_keys)?;
        node.record.seek_keys = 0;
        node.record.nbytes_keys = 0;

        let mut key = Key::new(
            &node.class,
            &node.name,
            &node.title,
            1,
            self.datime(),
            node.record.seek_dir,
            self.big(),
        )?;
        let mut w = WBuffer::new(key.keylen as u64);
        w.write_i32(node.keys.len() as i32);
        for k in &node.keys {
            k.write(&mut w);
        }
        let payload = w.into_bytes();
        key.objlen = payload.len() as i32;
        self.write_key(&mut key, &payload)?;
        node.record.seek_keys = key.seek_key;
        node.record.nbytes_keys = key.nbytes;

        node.record.set_big(self.big());
        let at = node.record.seek_dir + i64::from(node.record.nbytes_name);
        let mut w = WBuffer::new(at as u64);
        node.record.marshal(&mut w)?;
        self.storage.write_at(at, w.bytes())?;
        tracing::trace!(dir = %node.name, keys = node.keys.len(), "saved directory");
        Ok(())
    }

    fn write_streamers(&mut self, seek_pdir: i64) -> Result<()> {
        self.free_record(self.header.seek_info, self.header.nbytes_info)?;
        self.header.seek_info = 0;
        self.header.nbytes_info = 0;

        let mut list = self.streamers.to_list();
        list.name = "StreamerInfo".to_owned();
        let mut key = Key::new(
            "TList",
            "StreamerInfo",
            "Doubly linked list",
            1,
            self.datime(),
            seek_pdir,
            self.big(),
        )?;
        let (payload, objlen) = self.encode(&list, key.keylen)?;
        key.objlen = objlen;
        self.write_key(&mut key, &payload)?;
        self.header.seek_info = key.seek_key;
        self.header.nbytes_info = key.nbytes;
        tracing::debug!(infos = self.streamers.len(), seek = key.seek_key, "wrote streamer catalog");
        Ok(())
    }

    fn write_free_segments(&mut self, root: &DirNode) -> Result<()> {
        self.free_record(self.header.seek_free, self.header.nbytes_free)?;
        self.header.seek_free = 0;
        self.header.nbytes_free = 0;

        let mut key = Key::new(
            &root.class,
            &root.name,
            &root.title,
            1,
            self.datime(),
            root.record.seek_dir,
            self.big(),
        )?;
        // room for every segment in its widest form, the reservation
        // only shrinks the list
        key.objlen = (self.free.len().max(1) * 18) as i32;
        key.nbytes = i32::from(key.keylen) + key.objlen;
        let objlen = key.objlen as usize;

        let mut nfree = 0;
        let seek = self.write_record(i64::from(key.nbytes), |seek, free| {
            let records = free.to_bytes()?;
            if records.len() > objlen {
                return Err(Error::corrupt(
                    "free segments",
                    format!("{} bytes of segments in a {objlen}-byte record", records.len()),
                ));
            }
            nfree = free.len();
            let mut w = WBuffer::new(seek as u64);
            let mut placed = key.clone();
            placed.seek_key = seek;
            placed.write(&mut w);
            w.write_bytes(&records);
            w.write_bytes(&vec![0u8; objlen - records.len()]);
            Ok(w.into_bytes())
        })?;
        self.header.seek_free = seek;
        self.header.nbytes_free = key.nbytes;
        self.header.nfree = nfree as i32;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header.is_big() {
            self.header.units = 8;
        }
        let mut area = vec![0u8; self.header.begin as usize];
        self.header.write_to(&mut area)?;
        self.storage.write_at(0, &area)
    }

    fn read_free_segments(&self) -> Result<FreeList> {
        let key = self.read_key(self.header.seek_free)?;
        let data = self.storage.read_at(
            key.seek_key + i64::from(key.keylen),
            i64::from(key.nbytes - i32::from(key.keylen)),
        )?;
        Ok(FreeList::from_bytes(&data, self.header.nfree.max(0) as usize)?)
    }

    fn read_streamers(&self) -> Result<StreamerCatalog> {
        if self.header.seek_info <= 0 {
            tracing::debug!("no streamer catalog stored, using built-in descriptors");
            return Ok(StreamerCatalog::builtin().clone());
        }
        let key = self.read_key(self.header.seek_info)?;
        let list = List::try_from(key.decode(self)?)?;
        StreamerCatalog::from_list(&list)
    }

    fn read_keys(&self, record: &DirectoryRecord) -> Result<Vec<Key>> {
        if record.seek_keys <= 0 {
            return Ok(Vec::new());
        }
        let data = self
            .storage
            .read_at(record.seek_keys, i64::from(record.nbytes_keys))?;
        let mut r = RBuffer::new(&data, record.seek_keys as u64);
        Key::read_record(&mut r)?;
        let n = r.read_i32()?;
        if n < 0 {
            return Err(Error::corrupt("keys list", format!("negative key count {n}")));
        }
        (0..n).map(|_| Key::read_record(&mut r)).collect()
    }

    /// Load the keys of `node` and its subdirectories
    ///
    /// A damaged subdirectory is kept as a placeholder holding its error, so
    /// the rest of the tree stays readable.
    fn load_dir(&self, mut node: DirNode, depth: usize) -> Result<DirNode> {
        node.record.check_bounds(self.header.end)?;
        node.keys = self
            .read_keys(&node.record)
            .context(|| format!("keys of directory {:?}", node.name))?;
        for key in node.keys.iter().filter(|k| is_dir_class(&k.class)) {
            match self.load_subdir(key, depth) {
                Ok(sub) => node.dirs.push(sub),
                Err(err) => {
                    tracing::warn!(dir = %key.name, seek = key.seek_key, error = %err, "skipping damaged directory");
                    node.dirs.push(DirNode::broken(key, err));
                }
            }
        }
        Ok(node)
    }

    fn load_subdir(&self, key: &Key, depth: usize) -> Result<DirNode> {
        if depth >= MAX_DEPTH {
            return Err(Error::corrupt(
                "directory",
                format!("nesting deeper than {MAX_DEPTH} at {:?}", key.name),
            ));
        }
        let record = match key.decode(self)? {
            Object::Directory(record) => record,
            other => return Err(Error::mismatch("TDirectory", other.class())),
        };
        let sub = DirNode::new(record, &key.class, &key.name, &key.title);
        self.load_dir(sub, depth + 1)
            .context(|| format!("directory {:?}", key.name))
    }
}

/// Record the descriptors needed to read `obj` back
fn register_streamers(streamers: &mut StreamerCatalog, obj: &Object) -> Result<()> {
    let builtin = StreamerCatalog::builtin();
    match obj {
        Object::Generic(record) => register_record(streamers, record),
        Object::Opaque(_) | Object::Directory(_) => Ok(()),
        Object::Tree(tree) => {
            streamers.import("TTree", builtin)?;
            for class in tree.stored_classes() {
                streamers.import(class, builtin)?;
            }
            streamers.import("TBasket", builtin)
        }
        other => streamers.import(other.class(), builtin),
    }
}

fn register_record(streamers: &mut StreamerCatalog, record: &Record) -> Result<()> {
    if !is_container(&record.class) {
        let info: &StreamerInfo = record.plan.info();
        streamers.add(info.clone())?;
        for dep in record.plan.dependencies() {
            streamers.import(dep, StreamerCatalog::builtin())?;
        }
    }
    for (_, value) in record.fields() {
        register_value(streamers, value)?;
    }
    Ok(())
}

fn register_value(streamers: &mut StreamerCatalog, value: &Value) -> Result<()> {
    match value {
        Value::Record(record) => register_record(streamers, record),
        Value::Array(items) => items.iter().try_for_each(|v| register_value(streamers, v)),
        Value::Map(pairs) => pairs.iter().try_for_each(|(k, v)| {
            register_value(streamers, k)?;
            register_value(streamers, v)
        }),
        Value::Object(Some(obj)) => register_streamers(streamers, obj),
        _ => Ok(()),
    }
}

fn make_uuid(path: &Path, datime: u32) -> [u8; UUID_SIZE] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seed = path.to_string_lossy();
    let mut uuid = [0u8; UUID_SIZE];
    uuid[1] = 1;
    uuid[2..10].copy_from_slice(&xxh64(seed.as_bytes(), u64::from(datime)).to_be_bytes());
    uuid[10..].copy_from_slice(&xxh64(seed.as_bytes(), nanos).to_be_bytes());
    uuid
}

/// A ROOT file opened for reading, or created for writing
///
/// Writable files must be [closed](File::close): the directory index, the
/// streamer catalog and the free list are only written then.
pub struct File {
    path: PathBuf,
    pub(crate) io: FileIo,
    root: DirNode,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("storage", &self.io.storage)
            .field("keys", &self.root.keys.len())
            .field("closed", &self.io.closed)
            .finish()
    }
}

impl File {
    /// Open an existing file read-only
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, FileConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: FileConfig) -> Result<Self> {
        let path = path.as_ref();
        let storage = Storage::open(path, config.mmap).context(|| path.display().to_string())?;
        Self::load(path.to_path_buf(), storage, config).context(|| path.display().to_string())
    }

    /// Read a file held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::load(PathBuf::from("<memory>"), Storage::Memory(bytes), FileConfig::default())
    }

    fn load(path: PathBuf, storage: Storage, config: FileConfig) -> Result<Self> {
        let _span = tracing::debug_span!("open", path = %path.display()).entered();
        let head_len = (storage.len() as i64).min(BEGIN);
        let header = FileHeader::from_bytes(&storage.read_at(0, head_len)?)?;
        if !(10..=1000).contains(&header.nbytes_name) {
            return Err(Error::corrupt(
                "file header",
                format!("root directory name length {} outside [10, 1000]", header.nbytes_name),
            ));
        }

        let mut io = FileIo {
            storage,
            header,
            free: FreeList::new(),
            streamers: StreamerCatalog::new(),
            registry: ClassRegistry::new(),
            config,
            closed: false,
        };

        let begin = io.header.begin;
        let want = i64::from(io.header.nbytes_name) + DirectoryRecord::SIZE as i64;
        let have = io.storage.len() as i64 - begin;
        let data = io.storage.read_at(begin, want.min(have))?;
        let mut r = RBuffer::new(&data, begin as u64);
        let key = Key::read_record(&mut r).context(|| "root directory")?;
        let name = r.read_string()?;
        let title = r.read_string()?;
        r.set_pos((begin + i64::from(io.header.nbytes_name)) as u64)?;
        let record = DirectoryRecord::unmarshal(&mut r).context(|| "root directory")?;
        drop(data);

        if io.header.seek_free > 0 {
            io.free = io.read_free_segments().context(|| "free segments")?;
        }
        io.streamers = io.read_streamers().context(|| "streamer catalog")?;
        for rename in &io.config.renames {
            io.streamers.rename(&rename.class, &rename.from, &rename.to);
        }

        let root = io.load_dir(DirNode::new(record, &key.class, &name, &title), 0)?;
        tracing::debug!(
            version = io.header.version,
            end = io.header.end,
            keys = root.keys.len(),
            streamers = io.streamers.len(),
            "opened file"
        );
        Ok(Self { path, io, root })
    }

    /// Create or truncate a file for writing
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with(path, FileConfig::default())
    }

    pub fn create_with(path: impl AsRef<Path>, config: FileConfig) -> Result<Self> {
        let path = path.as_ref();
        let storage = Storage::create(path).context(|| path.display().to_string())?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = config.title.clone();

        let mut io = FileIo {
            storage,
            header: FileHeader::new(),
            free: FreeList::for_new_file(),
            streamers: StreamerCatalog::new(),
            registry: ClassRegistry::new(),
            config,
            closed: false,
        };
        let datime = io.datime();
        io.header.compression = io.config.settings.code();
        io.header.uuid = make_uuid(path, datime);

        let namelen = string_size(&name) + string_size(&title);
        let mut key = Key::new("TFile", &name, &title, 1, datime, 0, false)?;
        key.objlen = (namelen + DirectoryRecord::SIZE) as i32;
        key.nbytes = i32::from(key.keylen) + key.objlen;
        let nbytes_name = i32::from(key.keylen) + namelen as i32;

        let mut record = DirectoryRecord::new(datime, false);
        record.nbytes_name = nbytes_name;
        record.uuid = io.header.uuid;

        let seek = io.write_record(i64::from(key.nbytes), |seek, _| {
            let mut w = WBuffer::new(seek as u64);
            let mut placed = key.clone();
            placed.seek_key = seek;
            placed.write(&mut w);
            w.write_string(&name);
            w.write_string(&title);
            DirectoryRecord {
                seek_dir: seek,
                ..record.clone()
            }
            .marshal(&mut w)?;
            Ok(w.into_bytes())
        })?;
        record.seek_dir = seek;
        io.header.nbytes_name = nbytes_name;
        io.write_header()?;

        tracing::debug!(path = %path.display(), "created file");
        Ok(Self {
            path: path.to_path_buf(),
            io,
            root: DirNode::new(record, "TFile", &name, &title),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.io.header
    }

    /// Format version, without the big-file offset
    pub fn version(&self) -> i32 {
        self.io.header.version
    }

    pub fn is_writable(&self) -> bool {
        self.io.storage.is_writable() && !self.io.closed
    }

    pub fn free_segments(&self) -> &FreeList {
        &self.io.free
    }

    /// Registries to decode with, for buffers built by hand
    pub fn context(&self) -> Context<'_> {
        self.io.context()
    }

    /// Register extra class decoders
    pub fn registry_mut(&mut self) -> &mut ClassRegistry {
        &mut self.io.registry
    }

    pub fn root(&self) -> Directory<'_> {
        Directory {
            file: self,
            node: &self.root,
        }
    }

    /// Directory at a `/`-separated path
    pub fn dir(&self, path: &str) -> Result<Directory<'_>> {
        self.root().dir(path)
    }

    pub fn dir_mut(&mut self, path: &str) -> Result<DirectoryMut<'_>> {
        self.io.check_writable()?;
        Ok(DirectoryMut {
            io: &mut self.io,
            node: self.root.walk_mut(path)?,
        })
    }

    /// Keys of the root directory
    pub fn keys(&self) -> &[Key] {
        &self.root.keys
    }

    /// Key of the root directory selected by `name;cycle`
    pub fn key(&self, namecycle: &str) -> Result<&Key> {
        self.root.key(namecycle)
    }

    /// Decode the object at `a/b/name;cycle`
    pub fn get(&self, path: &str) -> Result<Object> {
        self.root().get(path)
    }

    /// Store `obj` in the root directory; returns the new cycle
    pub fn put(&mut self, name: &str, obj: impl Into<Object>) -> Result<i16> {
        self.io.put(&mut self.root, name, &obj.into())
    }

    /// Remove `a/b/name;cycle` and free its bytes
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let (dir, namecycle) = split_path(path);
        let node = self.root.walk_mut(dir)?;
        self.io.delete(node, namecycle)
    }

    /// Create a directory; every component but the last must exist
    pub fn mkdir(&mut self, path: &str) -> Result<DirectoryMut<'_>> {
        let (parent, name) = split_path(path.trim_end_matches('/'));
        let parent = self.dir_mut(parent)?;
        let at = parent.io.mkdir(parent.node, name)?;
        let DirectoryMut { io, node } = parent;
        Ok(DirectoryMut {
            io,
            node: &mut node.dirs[at],
        })
    }

    /// Latest descriptor of `class` in the file's catalog
    pub fn streamer_info(&self, class: &str) -> Option<&StreamerInfo> {
        self.io.streamers.latest(class)
    }

    pub fn streamer_infos(&self) -> impl Iterator<Item = &StreamerInfo> {
        self.io.streamers.infos()
    }

    pub fn streamers(&self) -> &StreamerCatalog {
        &self.io.streamers
    }

    /// Tree stored at `a/b/name;cycle`
    pub fn tree(&self, path: &str) -> Result<Tree> {
        Tree::try_from(self.get(path)?).context(|| format!("tree {path:?}"))
    }

    /// Write the streamer catalog, directory indexes, free list and header
    ///
    /// Read-only files are simply marked closed. Calling `close` twice is
    /// harmless.
    pub fn close(&mut self) -> Result<()> {
        if self.io.closed {
            return Ok(());
        }
        if self.io.storage.is_writable() {
            let _span = tracing::debug_span!("close", path = %self.path.display()).entered();
            let seek_dir = self.root.record.seek_dir;
            self.io.write_streamers(seek_dir)?;
            self.io.save_dir(&mut self.root)?;
            self.io.write_free_segments(&self.root)?;
            self.io.header.nbytes_name = self.root.record.nbytes_name;
            self.io.write_header()?;
            self.io.storage.sync()?;
            tracing::debug!(end = self.io.header.end, nfree = self.io.header.nfree, "closed file");
        }
        self.io.closed = true;
        Ok(())
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.io.storage.is_writable() && !self.io.closed {
            tracing::warn!(
                path = %self.path.display(),
                "writable file dropped without close; its index was not written"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtypes::{Named, ObjString};

    fn config() -> FileConfig {
        FileConfig::default().with_datime(Datime::from_unix(1_700_000_000).pack())
    }

    #[test]
    fn test_create_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.root");
        let mut file = File::create_with(&path, config()).unwrap();
        assert_eq!(file.root.record.seek_dir, BEGIN);
        // 18 + 8 + "TFile" 6 + "empty.root" 11 + "" 1, then the two strings again
        assert_eq!(file.io.header.nbytes_name, 44 + 12);
        assert_eq!(file.io.header.end, BEGIN + 44 + 12 + 60);
        file.close().unwrap();
        file.close().unwrap();

        let back = File::open(&path).unwrap();
        assert_eq!(back.root().name(), "empty.root");
        assert!(back.keys().is_empty());
        assert!(!back.is_writable());
        assert_eq!(back.header().end, file.header().end);
    }

    #[test]
    fn test_gap_marker_in_reused_hole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gap.root");
        let mut file = File::create_with(&path, config().with_settings(rootio_core::Settings::NONE)).unwrap();
        file.put("big", ObjString::new("x".repeat(200))).unwrap();
        file.put("after", Named::new("n", "t")).unwrap();
        let hole = file.keys()[0].clone();
        file.delete("big").unwrap();
        file.put("small", ObjString::new("y")).unwrap();

        let small = file.key("small").unwrap().clone();
        assert_eq!(small.seek_key, hole.seek_key);
        let left = i64::from(hole.nbytes) - i64::from(small.nbytes);
        let marker = file
            .io
            .storage
            .read_at(small.seek_key + i64::from(small.nbytes), 4)
            .unwrap()
            .into_owned();
        assert_eq!(i32::from_be_bytes([marker[0], marker[1], marker[2], marker[3]]), -(left as i32));
        file.close().unwrap();

        let back = File::open(&path).unwrap();
        assert_eq!(back.get("small").unwrap().as_str(), Some("y"));
        assert_eq!(back.get("after").unwrap().name(), Some("n"));
        assert!(back.get("big").is_err());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.root");
        File::create(&path).unwrap().close().unwrap();

        let mut file = File::open(&path).unwrap();
        assert!(matches!(file.put("x", ObjString::new("x")), Err(Error::ReadOnly)));
        assert!(matches!(file.mkdir("d"), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_closed_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("c.root")).unwrap();
        file.close().unwrap();
        assert!(matches!(file.put("x", ObjString::new("x")), Err(Error::Closed)));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let err = File::from_bytes(b"not a root file at all".to_vec()).unwrap_err();
        assert!(err.is_corruption());
    }
}
