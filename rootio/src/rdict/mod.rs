//! Class schemas stored alongside the data
//!
//! A [`StreamerInfo`] lists the ordered members of one version of a class.
//! The [`StreamerCatalog`] keeps every version seen in a file, compiles each
//! into a [`Plan`] and decodes records of classes this crate has no native
//! type for into generic [`Record`]s.

pub mod bootstrap;
mod catalog;
mod element;
mod info;
mod plan;
mod stl;
mod value;

pub use catalog::StreamerCatalog;
pub use element::{CountRef, ElementKind, StreamerElement};
pub use info::StreamerInfo;
pub use plan::{Codec, CountSource, FieldKind, Op, Plan, ScalarCodec};
pub use stl::{container_info, is_container};
pub use value::{Record, Value};
