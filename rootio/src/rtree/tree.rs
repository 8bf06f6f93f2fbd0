//! `TTree` metadata

use super::branch::{AnyBranch, Branch};
use super::leaf::Leaf;
use super::{read_obj_array, write_obj_array, IoFeatures};
use crate::rbytes::{Marshal, RBuffer, Unmarshal, WBuffer};
use crate::rtypes::{AttFill, AttLine, AttMarker, Named};
use crate::{Error, Result};

/// Object references after the leaf array: aliases, index values, index,
/// tree index, friends, user info and branch ref
const TRAILING_REFS: usize = 7;

/// A tree: entry count, totals and the branch hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub named: Named,
    pub line: AttLine,
    pub fill: AttFill,
    pub marker: AttMarker,
    pub entries: i64,
    pub tot_bytes: i64,
    pub zip_bytes: i64,
    pub saved_bytes: i64,
    pub flushed_bytes: i64,
    pub weight: f64,
    pub timer_interval: i32,
    pub scan_field: i32,
    pub update: i32,
    pub default_entry_offset_len: i32,
    pub max_entries: i64,
    pub max_entry_loop: i64,
    pub max_virtual_size: i64,
    pub auto_save: i64,
    pub auto_flush: i64,
    pub estimate: i64,
    pub cluster_range_end: Vec<i64>,
    pub cluster_size: Vec<i64>,
    pub io_features: IoFeatures,
    pub branches: Vec<AnyBranch>,
    /// Every leaf of every branch, in branch order
    pub leaves: Vec<Leaf>,
}

impl Tree {
    pub const VERSION: i16 = 20;

    pub fn new(name: &str, title: &str) -> Self {
        Self {
            named: Named::new(name, title),
            line: AttLine::default(),
            fill: AttFill::default(),
            marker: AttMarker::default(),
            entries: 0,
            tot_bytes: 0,
            zip_bytes: 0,
            saved_bytes: 0,
            flushed_bytes: 0,
            weight: 1.0,
            timer_interval: 0,
            scan_field: 25,
            update: 0,
            default_entry_offset_len: 1000,
            max_entries: 1_000_000_000_000,
            max_entry_loop: 1_000_000_000_000,
            max_virtual_size: 0,
            auto_save: -300_000_000,
            auto_flush: -30_000_000,
            estimate: 1_000_000,
            cluster_range_end: Vec::new(),
            cluster_size: Vec::new(),
            io_features: IoFeatures::default(),
            branches: Vec::new(),
            leaves: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.named.name
    }

    pub fn title(&self) -> &str {
        &self.named.title
    }

    pub fn entries(&self) -> i64 {
        self.entries
    }

    /// Top-level branches
    pub fn branches(&self) -> &[AnyBranch] {
        &self.branches
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn leaf(&self, name: &str) -> Option<&Leaf> {
        self.leaves.iter().find(|l| l.name() == name)
    }

    /// Branch named `name` at any depth, or the branch holding leaf `name`
    pub fn branch(&self, name: &str) -> Result<&AnyBranch> {
        let path = self
            .branch_path(name)
            .ok_or_else(|| Error::BranchNotFound(name.to_owned()))?;
        let (first, rest) = path.0.split_first().ok_or_else(|| Error::BranchNotFound(name.to_owned()))?;
        let mut branch = &self.branches[*first];
        for &i in rest {
            branch = &branch.base().branches[i];
        }
        Ok(branch)
    }

    /// Index path to the branch providing `name` and the leaf index inside it
    pub(crate) fn branch_path(&self, name: &str) -> Option<(Vec<usize>, usize)> {
        let mut path = Vec::new();
        find_in(&self.branches, name, &mut path).map(|leaf| (path, leaf))
    }

    pub(crate) fn branch_at_mut(&mut self, path: &[usize]) -> Option<&mut Branch> {
        let (first, rest) = path.split_first()?;
        let mut branch = self.branches.get_mut(*first)?;
        for &i in rest {
            branch = branch.base_mut().branches.get_mut(i)?;
        }
        Some(branch.base_mut())
    }

    pub(crate) fn branch_at(&self, path: &[usize]) -> Option<&Branch> {
        let (first, rest) = path.split_first()?;
        let mut branch = self.branches.get(*first)?;
        for &i in rest {
            branch = branch.base().branches.get(i)?;
        }
        Some(branch.base())
    }

    /// Classes of every branch and leaf, each once
    pub fn stored_classes(&self) -> Vec<&str> {
        fn walk<'a>(branches: &'a [AnyBranch], out: &mut Vec<&'a str>) {
            for b in branches {
                out.push(rootio_core::Object::class(b));
                out.extend(b.base().leaves.iter().map(|l| l.class.as_str()));
                walk(&b.base().branches, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.branches, &mut out);
        out.extend(self.leaves.iter().map(|l| l.class.as_str()));
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Drop every cached basket
    pub(crate) fn release(&mut self) {
        for b in &mut self.branches {
            b.base_mut().release();
        }
    }
}

fn find_in(branches: &[AnyBranch], name: &str, path: &mut Vec<usize>) -> Option<usize> {
    for (i, b) in branches.iter().enumerate() {
        path.push(i);
        let base = b.base();
        if let Some(at) = base.leaves.iter().position(|l| l.name() == name) {
            return Some(at);
        }
        if base.name() == name && !base.leaves.is_empty() {
            return Some(0);
        }
        if let Some(at) = find_in(&base.branches, name, path) {
            return Some(at);
        }
        path.pop();
    }
    None
}

impl rootio_core::Object for Tree {
    fn class(&self) -> &str {
        "TTree"
    }
}

impl Unmarshal for Tree {
    fn unmarshal(r: &mut RBuffer<'_>) -> Result<Self> {
        let v = r.read_version("TTree")?;
        if !(16..=Self::VERSION).contains(&v.version) {
            return r.fail(Error::UnsupportedEncoding(format!("TTree version {}", v.version)));
        }
        let vers = v.version;
        let named = Named::unmarshal(r)?;
        let line = AttLine::unmarshal(r)?;
        let fill = AttFill::unmarshal(r)?;
        let marker = AttMarker::unmarshal(r)?;

        let entries = r.read_i64()?;
        let tot_bytes = r.read_i64()?;
        let zip_bytes = r.read_i64()?;
        let saved_bytes = r.read_i64()?;
        let flushed_bytes = if vers >= 18 { r.read_i64()? } else { 0 };
        let weight = r.read_f64()?;
        let timer_interval = r.read_i32()?;
        let scan_field = r.read_i32()?;
        let update = r.read_i32()?;
        let default_entry_offset_len = if vers >= 17 { r.read_i32()? } else { 0 };
        let nclus = if vers >= 19 { r.read_i32()? } else { 0 };
        if nclus < 0 {
            return r.fail(Error::corrupt("TTree", format!("negative cluster range count {nclus}")));
        }
        let max_entries = r.read_i64()?;
        let max_entry_loop = r.read_i64()?;
        let max_virtual_size = r.read_i64()?;
        let auto_save = r.read_i64()?;
        let auto_flush = if vers >= 18 { r.read_i64()? } else { 0 };
        let estimate = r.read_i64()?;

        let (cluster_range_end, cluster_size) = if vers >= 19 {
            r.read_i8()?;
            let ends = r.read_fast_array::<i64>(nclus as usize)?;
            r.read_i8()?;
            let sizes = r.read_fast_array::<i64>(nclus as usize)?;
            (ends, sizes)
        } else {
            (Vec::new(), Vec::new())
        };
        let io_features = if vers >= 20 {
            IoFeatures::unmarshal(r)?
        } else {
            IoFeatures::default()
        };

        let branches = read_obj_array::<AnyBranch>(r)?;
        let leaves = read_obj_array::<Leaf>(r)?;
        for _ in 0..TRAILING_REFS {
            r.read_object_any()?;
        }
        r.check_byte_count(&v, "TTree")?;

        Ok(Self {
            named,
            line,
            fill,
            marker,
            entries,
            tot_bytes,
            zip_bytes,
            saved_bytes,
            flushed_bytes,
            weight,
            timer_interval,
            scan_field,
            update,
            default_entry_offset_len,
            max_entries,
            max_entry_loop,
            max_virtual_size,
            auto_save,
            auto_flush,
            estimate,
            cluster_range_end,
            cluster_size,
            io_features,
            branches,
            leaves,
        })
    }
}

impl Marshal for Tree {
    fn marshal(&self, w: &mut WBuffer) -> Result<()> {
        if self.cluster_range_end.len() != self.cluster_size.len() {
            return Err(Error::InvalidArgument(format!(
                "tree {:?}: {} cluster ends for {} cluster sizes",
                self.named.name,
                self.cluster_range_end.len(),
                self.cluster_size.len()
            )));
        }
        let start = w.write_version(Self::VERSION);
        self.named.marshal(w)?;
        self.line.marshal(w)?;
        self.fill.marshal(w)?;
        self.marker.marshal(w)?;
        w.write_i64(self.entries);
        w.write_i64(self.tot_bytes);
        w.write_i64(self.zip_bytes);
        w.write_i64(self.saved_bytes);
        w.write_i64(self.flushed_bytes);
        w.write_f64(self.weight);
        w.write_i32(self.timer_interval);
        w.write_i32(self.scan_field);
        w.write_i32(self.update);
        w.write_i32(self.default_entry_offset_len);
        w.write_i32(self.cluster_range_end.len() as i32);
        w.write_i64(self.max_entries);
        w.write_i64(self.max_entry_loop);
        w.write_i64(self.max_virtual_size);
        w.write_i64(self.auto_save);
        w.write_i64(self.auto_flush);
        w.write_i64(self.estimate);
        w.write_i8(1);
        w.write_fast_array(&self.cluster_range_end);
        w.write_i8(1);
        w.write_fast_array(&self.cluster_size);
        self.io_features.marshal(w)?;

        let branches: Vec<&dyn Marshal> = self.branches.iter().map(|b| b as &dyn Marshal).collect();
        write_obj_array(w, &branches)?;
        let leaves: Vec<&dyn Marshal> = self.leaves.iter().map(|l| l as &dyn Marshal).collect();
        write_obj_array(w, &leaves)?;
        for _ in 0..TRAILING_REFS {
            w.write_object_any(None)?;
        }
        w.set_byte_count(start, "TTree")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rootio_core::parse_leaf_spec;

    fn sample() -> Tree {
        let mut tree = Tree::new("events", "sample events");
        let n = Leaf::from_spec(&parse_leaf_spec("n/I").unwrap(), None).unwrap();
        let hits = Leaf::from_spec(&parse_leaf_spec("hits[n]/F").unwrap(), Some(&n)).unwrap();
        tree.branches.push(Branch::new("n", "n/I", n.clone(), 101, 32_000).into());
        tree.branches.push(Branch::new("hits", "hits[n]/F", hits.clone(), 101, 32_000).into());
        tree.leaves = vec![n, hits];
        tree.cluster_range_end = vec![99];
        tree.cluster_size = vec![100];
        tree
    }

    #[test]
    fn test_tree_roundtrip_shares_leaves() {
        let tree = sample();
        let mut w = WBuffer::new(0);
        tree.marshal(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = RBuffer::new(&bytes, 0);
        let back = Tree::unmarshal(&mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(back, tree);
        assert_eq!(back.leaf("hits").unwrap().count_name(), Some("n"));
    }

    #[test]
    fn test_branch_lookup() {
        let mut tree = sample();
        assert_eq!(tree.branch("hits").unwrap().name(), "hits");
        assert!(matches!(tree.branch("missing"), Err(Error::BranchNotFound(_))));
        assert_eq!(tree.branch_path("hits"), Some((vec![1], 0)));
        assert_eq!(tree.branch_at_mut(&[1]).unwrap().name(), "hits");
        assert!(tree.branch_at(&[2]).is_none());
        assert_eq!(tree.stored_classes(), vec!["TBranch", "TLeafF", "TLeafI"]);
    }

    #[test]
    fn test_old_version_rejected() {
        let mut w = WBuffer::new(0);
        let start = w.write_version(5);
        w.write_i32(0);
        w.set_byte_count(start, "TTree").unwrap();
        let bytes = w.into_bytes();
        let err = Tree::unmarshal(&mut RBuffer::new(&bytes, 0)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(_)));
    }
}
