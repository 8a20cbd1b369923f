//! Primitive pipeline operations.
//!
//! - [`filters`] - Record predicates (comparison, string matching, membership, logic)
//! - [`transforms`] - Record rewrites (field structure, strings, numbers, casts)

pub mod filters;
pub mod transforms;

pub use filters::Predicate;
pub use transforms::{CastTarget, RecordTransform, Transformed};
