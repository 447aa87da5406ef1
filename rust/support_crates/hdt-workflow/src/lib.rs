//! Coordination primitives for the multi-stage index builders.
//!
//! - [`simple_mpmc`] - a bounded multi-producer, multi-consumer queue whose
//!   blocking operations can poll with a timeout.
//! - [`failure_cell`] - a shared slot holding the first error raised by any
//!   worker of a pipeline.

pub mod failure_cell;
pub mod simple_mpmc;

pub use failure_cell::FailureCell;
pub use simple_mpmc::SimpleMpmcQueue;
