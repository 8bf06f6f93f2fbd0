//! Writing trees entry by entry

use rootio_core::{parse_leaf_spec, validate_name, Settings};

use super::basket::{Basket, BASKET_HEADER_LEN};
use super::branch::Branch;
use super::leaf::{Leaf, LeafValue};
use super::tree::Tree;
use crate::config::TreeConfig;
use crate::rbytes::{Marshal, WBuffer};
use crate::rcompress::compress;
use crate::riofs::{DirectoryMut, File, Key};
use crate::{Error, Result};

/// Pending entries of one branch
#[derive(Debug)]
struct Column {
    branch: Branch,
    /// Column holding the element count of a counted array
    count: Option<usize>,
    /// Entries of variable size need an offset table
    variable: bool,
    data: Vec<u8>,
    /// Start of each pending entry in `data`
    offsets: Vec<i32>,
    /// Largest value seen, for count columns
    max_count: i64,
}

impl Column {
    fn leaf(&self) -> &Leaf {
        &self.branch.leaves[0]
    }

    fn pending(&self) -> i64 {
        self.offsets.len() as i64
    }

    /// Bytes of one entry for fixed-size columns
    fn entry_size(&self) -> i32 {
        let leaf = self.leaf();
        leaf.len_type * leaf.len.max(1)
    }
}

/// Writes a tree into a directory
///
/// Branches are declared before the first [`fill`](TreeWriter::fill). Each
/// branch flushes a basket when it holds
/// [`basket_entries`](TreeConfig::basket_entries) entries or
/// [`basket_size`](TreeConfig::basket_size) bytes. The tree itself is
/// written by [`close`](TreeWriter::close).
///
/// ```no_run
/// use rootio::{File, LeafValue, TreeConfig};
///
/// let mut file = File::create("events.root")?;
/// let mut w = file.tree_writer("events", TreeConfig::default())?;
/// w.branch("n/I")?;
/// w.branch("px[n]/D")?;
/// w.fill(&[LeafValue::I32(2), LeafValue::Array(vec![LeafValue::F64(1.0), LeafValue::F64(2.0)])])?;
/// w.close()?;
/// drop(w);
/// file.close()?;
/// # Ok::<(), rootio::Error>(())
/// ```
pub struct TreeWriter<'f> {
    dir: DirectoryMut<'f>,
    tree: Tree,
    config: TreeConfig,
    settings: Settings,
    columns: Vec<Column>,
    entries: i64,
    closed: bool,
}

impl std::fmt::Debug for TreeWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWriter")
            .field("tree", &self.tree.name())
            .field("columns", &self.columns.iter().map(|c| c.branch.name()).collect::<Vec<_>>())
            .field("entries", &self.entries)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<'f> TreeWriter<'f> {
    pub fn new(dir: DirectoryMut<'f>, name: &str, config: TreeConfig) -> Result<Self> {
        dir.io.check_writable()?;
        validate_name(name)?;
        let settings = config.settings.unwrap_or(dir.io.config.settings);
        let mut tree = Tree::new(name, &config.title);
        tree.default_entry_offset_len = config.entry_offset_len;
        Ok(Self {
            dir,
            tree,
            config,
            settings,
            columns: Vec::new(),
            entries: 0,
            closed: false,
        })
    }

    pub fn entries(&self) -> i64 {
        self.entries
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn declare(&mut self, leaf: Leaf, title: String, count: Option<usize>) -> Result<()> {
        self.check_open()?;
        if self.entries > 0 {
            return Err(Error::InvalidArgument(format!(
                "branch {:?} declared after {} entries were filled",
                leaf.name(),
                self.entries
            )));
        }
        validate_name(leaf.name())?;
        if self.columns.iter().any(|c| c.branch.name() == leaf.name()) {
            return Err(Error::InvalidArgument(format!("branch {:?} already declared", leaf.name())));
        }
        let variable = count.is_some() || leaf.is_string();
        let name = leaf.name().to_owned();
        let mut branch = Branch::new(
            &name,
            &title,
            leaf,
            self.settings.code(),
            self.config.basket_size as i32,
        );
        if variable {
            branch.entry_offset_len = self.config.entry_offset_len.max(1);
        }
        tracing::debug!(tree = self.tree.name(), branch = %name, title = %title, "declared branch");
        self.columns.push(Column {
            branch,
            count,
            variable,
            data: Vec::new(),
            offsets: Vec::new(),
            max_count: 0,
        });
        Ok(())
    }

    /// Declare a branch from a leaf title such as `px/D`, `v[3]/I` or
    /// `hits[n]/F`
    ///
    /// The count of a counted array must be an integer scalar branch
    /// declared earlier.
    pub fn branch(&mut self, title: &str) -> Result<()> {
        let spec = parse_leaf_spec(title)?;
        let count = match spec.count {
            None => None,
            Some(name) => {
                let at = self
                    .columns
                    .iter()
                    .position(|c| c.branch.name() == name)
                    .ok_or_else(|| Error::BranchNotFound(name.to_owned()))?;
                let leaf = self.columns[at].leaf();
                let integer = leaf.scalar().is_some_and(|s| s.is_integer());
                if !integer || leaf.len > 1 || leaf.count.is_some() {
                    return Err(Error::InvalidArgument(format!(
                        "count {name:?} of {:?} is not an integer scalar",
                        spec.name
                    )));
                }
                Some(at)
            }
        };
        let count_leaf = count.map(|at| self.columns[at].leaf());
        let leaf = Leaf::from_spec(&spec, count_leaf)?;
        self.declare(leaf, title.to_owned(), count)
    }

    /// Declare a branch holding one string per entry
    pub fn string_branch(&mut self, name: &str) -> Result<()> {
        self.declare(Leaf::string(name), format!("{name}/C"), None)
    }

    /// Append one entry, one value per declared branch in declaration order
    ///
    /// Nothing is appended unless every value matches its branch.
    pub fn fill(&mut self, values: &[LeafValue]) -> Result<()> {
        self.check_open()?;
        if values.len() != self.columns.len() {
            return Err(Error::InvalidArgument(format!(
                "{} values for {} branches",
                values.len(),
                self.columns.len()
            )));
        }

        let mut encoded = Vec::with_capacity(values.len());
        for (col, value) in self.columns.iter().zip(values) {
            let leaf = col.leaf();
            let expected = match col.count {
                Some(c) => {
                    let n = values[c]
                        .as_i64()
                        .filter(|n| *n >= 0)
                        .ok_or_else(|| Error::InvalidArgument(format!("count of {:?} is {:?}", leaf.name(), values[c])))?;
                    Some(n as usize * leaf.len.max(1) as usize)
                }
                None if leaf.len > 1 => Some(leaf.len as usize),
                None => None,
            };
            match (expected, value) {
                (Some(n), LeafValue::Array(items)) if items.len() != n => {
                    return Err(Error::InvalidArgument(format!(
                        "branch {:?} expects {n} values, got {}",
                        leaf.name(),
                        items.len()
                    )));
                }
                (Some(_), LeafValue::Array(_)) => {}
                (Some(_), other) => return Err(Error::mismatch("array", other.kind())),
                (None, LeafValue::Array(_)) => return Err(Error::mismatch("scalar", "array")),
                (None, _) => {}
            }
            let mut w = WBuffer::new(0);
            leaf.write_value(&mut w, value)?;
            encoded.push(w.into_bytes());
        }

        for (i, bytes) in encoded.into_iter().enumerate() {
            let col = &mut self.columns[i];
            col.offsets.push(col.data.len() as i32);
            col.data.extend_from_slice(&bytes);
            if let Some(c) = col.count {
                let n = values[c].as_i64().unwrap_or(0);
                self.columns[c].max_count = self.columns[c].max_count.max(n);
            }
        }
        self.entries += 1;

        for i in 0..self.columns.len() {
            let col = &self.columns[i];
            if col.pending() as usize >= self.config.basket_entries || col.data.len() >= self.config.basket_size {
                self.flush(i)?;
            }
        }
        Ok(())
    }

    /// Write the pending entries of column `i` as one basket
    fn flush(&mut self, i: usize) -> Result<()> {
        let io = &mut *self.dir.io;
        let seek_pdir = self.dir.node.record.seek_dir;
        let tree_name = self.tree.name();
        let col = &mut self.columns[i];
        let nev = col.pending();
        if nev == 0 {
            return Ok(());
        }

        let mut key = Key::new("TBasket", col.branch.name(), tree_name, 1, io.datime(), seek_pdir, io.big())?;
        key.keylen = key
            .keylen
            .checked_add(BASKET_HEADER_LEN as i16)
            .ok_or_else(|| Error::InvalidArgument(format!("basket key of {:?} too long", col.branch.name())))?;
        let keylen = i32::from(key.keylen);

        let mut w = WBuffer::new(keylen as u64);
        w.write_bytes(&col.data);
        let last = keylen + col.data.len() as i32;
        if col.variable {
            w.write_i32(nev as i32 + 1);
            for off in &col.offsets {
                w.write_i32(keylen + off);
            }
            w.write_i32(0);
        }
        let raw = w.into_bytes();
        let stored = compress(self.settings, &raw)?;
        key.objlen = raw.len() as i32;
        key.nbytes = keylen + stored.len() as i32;

        let header = Basket {
            key,
            version: Basket::VERSION,
            buffer_size: col.branch.basket_size.max(last),
            nev_size: if col.variable {
                col.branch.entry_offset_len
            } else {
                col.entry_size()
            },
            nev_buf: nev as i32,
            last,
            offsets: Vec::new(),
            data: None,
        };
        let nbytes = header.key.nbytes;
        let seek = io.write_record(i64::from(nbytes), |seek, _| {
            let mut w = WBuffer::new(seek as u64);
            let mut placed = header.clone();
            placed.key.seek_key = seek;
            placed.marshal(&mut w)?;
            w.write_bytes(&stored);
            Ok(w.into_bytes())
        })?;

        let branch = &mut col.branch;
        let first = branch.basket_entry.last().copied().unwrap_or(0);
        branch.basket_bytes.push(nbytes);
        branch.basket_seek.push(seek);
        branch.basket_entry.push(first + nev);
        branch.write_basket += 1;
        branch.entries = first + nev;
        branch.entry_number = branch.entries;
        branch.tot_bytes += i64::from(keylen) + raw.len() as i64;
        branch.zip_bytes += i64::from(nbytes);
        tracing::debug!(
            branch = %branch.named.name,
            basket = branch.write_basket - 1,
            first,
            entries = nev,
            seek,
            nbytes,
            "flushed basket"
        );
        col.data.clear();
        col.offsets.clear();
        Ok(())
    }

    /// Flush every pending basket and store the tree; returns its key cycle
    ///
    /// A second call fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<i16> {
        self.check_open()?;
        for i in 0..self.columns.len() {
            self.flush(i)?;
        }

        for c in 0..self.columns.len() {
            if self.columns.iter().any(|col| col.count == Some(c)) {
                let max = self.columns[c].max_count;
                self.columns[c].branch.leaves[0].set_maximum(max);
            }
        }
        let mut tree = self.tree.clone();
        for col in &self.columns {
            let mut branch = col.branch.clone();
            branch.entries = self.entries;
            branch.entry_number = self.entries;
            branch.max_baskets = branch.max_baskets.max(branch.write_basket + 1);
            if let Some(c) = col.count {
                branch.leaves[0].count = Some(Box::new(self.columns[c].leaf().clone()));
            }
            tree.tot_bytes += branch.tot_bytes;
            tree.zip_bytes += branch.zip_bytes;
            tree.leaves.push(branch.leaves[0].clone());
            tree.branches.push(branch.into());
        }
        tree.entries = self.entries;
        tree.saved_bytes = tree.zip_bytes;
        tree.flushed_bytes = tree.zip_bytes;

        let name = tree.name().to_owned();
        let cycle = self.dir.put(&name, tree.clone())?;
        tracing::debug!(tree = %name, cycle, entries = self.entries, branches = self.columns.len(), "wrote tree");
        self.tree = tree;
        self.closed = true;
        Ok(cycle)
    }
}

impl Drop for TreeWriter<'_> {
    fn drop(&mut self) {
        if !self.closed && !self.columns.is_empty() {
            tracing::warn!(
                tree = self.tree.name(),
                entries = self.entries,
                "tree writer dropped without close; the tree was not written"
            );
        }
    }
}

impl File {
    /// Start writing a tree in the root directory
    pub fn tree_writer(&mut self, name: &str, config: TreeConfig) -> Result<TreeWriter<'_>> {
        TreeWriter::new(self.dir_mut("")?, name, config)
    }
}

impl DirectoryMut<'_> {
    /// Start writing a tree in this directory
    pub fn tree_writer(&mut self, name: &str, config: TreeConfig) -> Result<TreeWriter<'_>> {
        let dir = DirectoryMut {
            io: &mut *self.io,
            node: &mut *self.node,
        };
        TreeWriter::new(dir, name, config)
    }
}
