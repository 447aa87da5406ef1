//! Out-of-core scatter of `(slot, value)` writes into a dense sequence.

pub mod bucketed;
pub mod codec;
pub mod pipeline;

pub use bucketed::{BucketedSpool, SpoolBatch};
pub use codec::ChunkCodec;
pub use pipeline::{DirectSink, PipelineSink, ScatterSink, run_pipelined};
