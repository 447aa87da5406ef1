//! File-based and in-memory implementations of the `hdt-io` abstractions.

pub mod budget;
pub mod temp_file_store;
