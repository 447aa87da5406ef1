//! Compact triple index in the HDT BitmapTriples layout.
//!
//! A [`BitmapTriples`] stores a sorted set of integer-ID triples as two
//! levels of adjacency lists (`Y` lists per `X`, `Z` lists per `(X, Y)`) over
//! bit-packed sequences and rank/select bitmaps. Pattern search serves the
//! prefixes of its native order directly, and falls back to an object index,
//! a predicate index or cached indexes in other orders for the rest.

pub mod adjacency;
pub mod bitmap_triples;
pub mod index_file;
pub mod merge;
pub mod object_index;
pub mod options;
pub mod order;
pub mod spool;
pub mod triple;

pub use adjacency::AdjacencyList;
pub use bitmap_triples::{BitmapTriples, search::SearchIter};
pub use object_index::{IndexSet, ObjectIndex, PredicateIndex};
pub use options::{ObjectIndexOptions, ObjectIndexStrategy, SpoolOptions, TriplesOptions};
pub use order::{OrderSet, TripleOrder};
pub use triple::TripleId;
