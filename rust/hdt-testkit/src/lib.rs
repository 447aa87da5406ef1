//! Test helpers for the HDT crates.
//!
//! - [`data_gen`]: random triple sets that satisfy the loader's contiguity
//!   rules, sorted in any component order.
//! - [`oracle`]: brute-force pattern matching to check search results against.
//! - [`dirs`]: scratch directories.
//!
//! Triples are plain `[subject, predicate, object]` arrays so the helpers do
//! not depend on the crates under test.

pub mod data_gen;
pub mod dirs;
pub mod oracle;

/// A triple as `[subject, predicate, object]`.
pub type Spo = [u64; 3];
