//! rootio - Reader and writer for ROOT files
//!
//! ROOT files are self-describing binary containers: a fixed header, keyed
//! records organized in nested directories, a catalog of class schemas
//! (streamer infos) and columnar trees whose entries are split over
//! compressed baskets.
//!
//! ## Architecture
//!
//! - **rootio-core**: fixed layouts, constants, free-space bookkeeping and
//!   parsing helpers (no I/O)
//! - **rootio**: the object codec, compression, schemas, files and trees
//!
//! | module | role |
//! |---|---|
//! | [`rbytes`] | big-endian buffers, versioned envelopes, object references |
//! | [`rcompress`] | block compression (zlib, LZ4, LZMA, ZSTD) |
//! | [`rtypes`] | built-in classes and the class registry |
//! | [`rdict`] | streamer infos and schema-driven decoding |
//! | [`riofs`] | files, directories and keys |
//! | [`rtree`] | trees, branches, baskets, leaves and scanning |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rootio::{File, ObjString};
//!
//! fn example() -> rootio::Result<()> {
//!     let mut file = File::create("hello.root")?;
//!     file.put("greeting", ObjString::new("hello"))?;
//!     file.close()?;
//!
//!     let file = File::open("hello.root")?;
//!     let obj = file.get("greeting")?;
//!     assert_eq!(obj.as_str(), Some("hello"));
//!     Ok(())
//! }
//! ```
//!
//! Reading a tree:
//!
//! ```rust,no_run
//! use rootio::{File, Scanner};
//!
//! fn example() -> rootio::Result<()> {
//!     let file = File::open("events.root")?;
//!     let tree = file.tree("events")?;
//!     let mut sc = Scanner::with_vars(&file, tree, &["px"])?;
//!     while sc.next() {
//!         sc.scan()?;
//!         println!("{:?}", sc.value("px"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod rbytes;
pub mod rcompress;
pub mod rdict;
pub mod riofs;
pub mod rtree;
pub mod rtypes;

pub use rootio_core::{Algorithm, Datime, FileHeader, FreeList, Scalar, Settings};

pub use config::{FileConfig, TreeConfig};
pub use error::{Error, Result};
pub use rdict::{Record, StreamerCatalog, StreamerInfo, Value};
pub use riofs::{Directory, DirectoryMut, File, Key};
pub use rtree::{Branch, Leaf, LeafValue, ScanEntry, Scanner, Tree, TreeWriter};
pub use rtypes::{Named, ObjString, Object};
