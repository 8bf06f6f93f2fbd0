//! rootio-core - ROOT container format definitions
//!
//! This crate provides the fixed-layout structures, constants, free-space
//! bookkeeping and parsing helpers of the ROOT file format. It performs no
//! I/O; see the `rootio` crate for reading and writing files.

#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod format;
#[cfg(feature = "alloc")]
pub mod freelist;
pub mod traits;
pub mod validation;

pub use error::*;
pub use format::*;
#[cfg(feature = "alloc")]
pub use freelist::{Allocation, FreeList, FreeSegment};
pub use traits::*;
pub use validation::*;
