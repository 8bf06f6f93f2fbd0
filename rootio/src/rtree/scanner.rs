//! Sequential and random access to tree entries

use super::leaf::LeafValue;
use super::tree::Tree;
use crate::error::ResultExt;
use crate::rdict::Value;
use crate::riofs::File;
use crate::{Error, Result};

/// One bound leaf: where to find it and which binding holds its count
#[derive(Debug, Clone)]
struct Binding {
    name: String,
    path: Vec<usize>,
    leaf: usize,
    count: Option<usize>,
}

/// A type filled from the values of one entry
///
/// ```no_run
/// use rootio::rtree::{LeafValue, ScanEntry};
///
/// struct Hit {
///     n: i32,
///     energy: Vec<f32>,
/// }
///
/// impl ScanEntry for Hit {
///     fn branches() -> &'static [&'static str] {
///         &["n", "energy"]
///     }
///
///     fn from_values(values: Vec<LeafValue>) -> rootio::Result<Self> {
///         let mut it = values.into_iter();
///         let mut next = || {
///             it.next()
///                 .ok_or_else(|| rootio::Error::InvalidArgument("short entry".into()))
///         };
///         Ok(Hit {
///             n: next()?.try_into()?,
///             energy: next()?.try_into()?,
///         })
///     }
/// }
/// ```
pub trait ScanEntry: Sized {
    /// Leaves to bind, in the order `from_values` expects them
    fn branches() -> &'static [&'static str];

    fn from_values(values: Vec<LeafValue>) -> Result<Self>;
}

/// Cursor over the entries of a tree
///
/// Names are bound once at construction, along with the schemas of element
/// branches. [`next`](Scanner::next) advances the cursor and
/// [`scan`](Scanner::scan) decodes the current entry; count leaves needed by
/// counted arrays are bound and decoded first even when not requested.
pub struct Scanner<'f> {
    file: &'f File,
    tree: Tree,
    bindings: Vec<Binding>,
    /// Bindings asked for by the caller; hidden count bindings follow
    requested: usize,
    order: Vec<usize>,
    values: Vec<LeafValue>,
    entry: i64,
    err: Option<Error>,
    closed: bool,
}

impl std::fmt::Debug for Scanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("tree", &self.tree.name())
            .field("vars", &self.bindings.iter().map(|b| &b.name).collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<'f> Scanner<'f> {
    /// Bind every leaf of the tree
    pub fn new(file: &'f File, tree: Tree) -> Result<Self> {
        let names: Vec<String> = tree.leaves().iter().map(|l| l.name().to_owned()).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        Self::with_vars(file, tree, &names)
    }

    /// Bind the named leaves, or the first leaf of the named branches
    pub fn with_vars(file: &'f File, mut tree: Tree, names: &[&str]) -> Result<Self> {
        let mut bindings: Vec<Binding> = Vec::with_capacity(names.len());
        for name in names {
            let binding = bind(&tree, name)?;
            bindings.push(binding);
        }
        let requested = bindings.len();

        for i in 0..requested {
            let leaf = tree
                .branch_at(&bindings[i].path)
                .and_then(|b| b.leaves.get(bindings[i].leaf))
                .ok_or_else(|| Error::BranchNotFound(bindings[i].name.clone()))?;
            let Some(count) = leaf.count_name().map(str::to_owned) else {
                continue;
            };
            let at = match bindings.iter().position(|b| b.name == count) {
                Some(at) => at,
                None => {
                    bindings.push(bind(&tree, &count)?);
                    bindings.len() - 1
                }
            };
            bindings[i].count = Some(at);
        }

        for binding in &bindings {
            tree.branch_at_mut(&binding.path)
                .ok_or_else(|| Error::BranchNotFound(binding.name.clone()))?
                .resolve_streamer(&file.io.streamers)?;
        }

        let mut order: Vec<usize> = (0..bindings.len()).filter(|&i| bindings[i].count.is_none()).collect();
        order.extend((0..bindings.len()).filter(|&i| bindings[i].count.is_some()));

        tracing::debug!(
            tree = tree.name(),
            vars = requested,
            hidden = bindings.len() - requested,
            entries = tree.entries(),
            "bound scanner"
        );
        Ok(Self {
            file,
            values: vec![Value::I32(0); bindings.len()],
            tree,
            bindings,
            requested,
            order,
            entry: -1,
            err: None,
            closed: false,
        })
    }

    /// Bind the leaves `T` is built from
    pub fn with_entry<T: ScanEntry>(file: &'f File, tree: Tree) -> Result<Self> {
        Self::with_vars(file, tree, T::branches())
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Current entry, -1 before the first [`next`](Scanner::next)
    pub fn entry(&self) -> i64 {
        self.entry
    }

    /// Advance to the next entry; false at the end, after an error or once closed
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.closed || self.err.is_some() {
            return false;
        }
        if self.entry + 1 >= self.tree.entries() {
            return false;
        }
        self.entry += 1;
        true
    }

    /// Position the cursor so the following [`next`](Scanner::next) lands on `entry`
    pub fn seek_entry(&mut self, entry: i64) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if entry < 0 || entry >= self.tree.entries() {
            return Err(Error::InvalidArgument(format!(
                "entry {entry} outside tree {:?} of {} entries",
                self.tree.name(),
                self.tree.entries()
            )));
        }
        self.entry = entry - 1;
        Ok(())
    }

    /// Decode the current entry into the bound values
    ///
    /// The first failure is kept and returned by [`err`](Scanner::err); the
    /// scanner stops advancing after it.
    pub fn scan(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if self.entry < 0 {
            return Err(Error::InvalidArgument("scan before next".to_owned()));
        }
        match self.load() {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(entry = self.entry, error = %err, "scan failed");
                self.err = Some(err.clone());
                Err(err)
            }
        }
    }

    fn load(&mut self) -> Result<()> {
        let entry = self.entry;
        for &i in &self.order {
            let binding = &self.bindings[i];
            let count = match binding.count {
                Some(c) => Some(self.values[c].as_i64().ok_or_else(|| {
                    Error::mismatch("integer count", self.values[c].kind())
                })?),
                None => None,
            };
            let branch = self
                .tree
                .branch_at_mut(&binding.path)
                .ok_or_else(|| Error::BranchNotFound(binding.name.clone()))?;
            branch.load_entry(self.file, entry)?;
            self.values[i] = branch
                .leaf_value(self.file, binding.leaf, count)
                .context(|| format!("leaf {:?}", binding.name))?;
        }
        Ok(())
    }

    /// Values of the requested names for the current entry, in binding order
    pub fn values(&self) -> &[LeafValue] {
        &self.values[..self.requested]
    }

    /// Value bound to `name`, count leaves included
    pub fn value(&self, name: &str) -> Option<&LeafValue> {
        self.bindings
            .iter()
            .position(|b| b.name == name)
            .map(|i| &self.values[i])
    }

    /// Decode the current entry and build a `T` from it
    pub fn scan_into<T: ScanEntry>(&mut self) -> Result<T> {
        self.scan()?;
        T::from_values(self.values().to_vec())
    }

    /// First error met while scanning
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Release the cached baskets; later calls to `scan` fail with `Closed`
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.tree.release();
        self.closed = true;
    }
}

fn bind(tree: &Tree, name: &str) -> Result<Binding> {
    let (path, leaf) = tree
        .branch_path(name)
        .ok_or_else(|| Error::BranchNotFound(name.to_owned()))?;
    Ok(Binding {
        name: name.to_owned(),
        path,
        leaf,
        count: None,
    })
}

macro_rules! scalar_conversions {
    ($($ty:ty => $($variant:ident)|+),* $(,)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = Error;

                fn try_from(v: Value) -> Result<Self> {
                    match v {
                        $(Value::$variant(x) => Ok(x),)+
                        other => Err(Error::mismatch(stringify!($ty), other.kind())),
                    }
                }
            }

            impl TryFrom<Value> for Vec<$ty> {
                type Error = Error;

                fn try_from(v: Value) -> Result<Self> {
                    match v {
                        Value::Array(items) => items.into_iter().map(<$ty>::try_from).collect(),
                        other => Err(Error::mismatch(concat!("array of ", stringify!($ty)), other.kind())),
                    }
                }
            }
        )*
    };
}

scalar_conversions! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(i32::try_from(Value::I32(4)).unwrap(), 4);
        assert!(matches!(i32::try_from(Value::F64(1.0)), Err(Error::TypeMismatch { .. })));
        let v = Value::Array(vec![Value::F32(1.0), Value::F32(2.5)]);
        assert_eq!(Vec::<f32>::try_from(v).unwrap(), vec![1.0, 2.5]);
        assert_eq!(String::try_from(Value::String("x".into())).unwrap(), "x");
        assert!(Vec::<f32>::try_from(Value::F32(1.0)).is_err());
    }
}
