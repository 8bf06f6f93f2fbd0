//! Format validation and string parsing utilities
//!
//! Pure functions with no I/O dependencies: range checks on offsets read from
//! disk, key selectors, leaf titles and template expressions.

pub mod bounds;
pub mod parsing;
#[cfg(feature = "alloc")]
pub mod template;

pub use bounds::{check_count, check_span};
pub use parsing::{parse_leaf_spec, parse_namecycle, validate_name, LeafSpec};
#[cfg(feature = "alloc")]
pub use template::CxxTemplate;
