//! Build-time configuration for triple indexes.

use std::{path::PathBuf, sync::Arc, time::Duration};

use hdt_common::{Result, error::Error, verify_arg};
use hdt_io::TemporaryFileStore;
use hdt_sequence::SequenceStorage;

use crate::spool::{ChunkCodec, bucketed::RECORD_SIZE};

/// Largest bucket a spool accepts: offsets inside a bucket are stored as
/// 32-bit values.
pub const MAX_BUCKET_SIZE: u64 = 1 << 32;

/// Largest batch a spool accepts. A batch may encode into a single chunk,
/// whose header stores both payload lengths as 32-bit values; the bound keeps
/// the raw chunk within the LZ4 input limit so the compressed one fits too.
pub const MAX_BUFFER_RECORDS: usize = 0x7E00_0000 / RECORD_SIZE;

/// Options for building a [`crate::BitmapTriples`].
#[derive(Debug, Clone)]
pub struct TriplesOptions {
    /// Backing storage of the level sequences.
    pub storage: SequenceStorage,
    /// Width the level sequences start with. Grown on demand.
    pub initial_bit_width: u32,
    /// Expected triple count, used to presize the sequences.
    pub expected_triples: u64,
    /// Whether loading a saved section re-checks level monotonicity.
    pub validate_levels: bool,
    pub object_index: ObjectIndexOptions,
}

impl Default for TriplesOptions {
    fn default() -> Self {
        TriplesOptions {
            storage: SequenceStorage::Memory,
            initial_bit_width: 32,
            expected_triples: 0,
            validate_levels: false,
            object_index: ObjectIndexOptions::default(),
        }
    }
}

impl TriplesOptions {
    pub fn validate(&self) -> Result<()> {
        verify_arg!(initial_bit_width, self.initial_bit_width <= 64);
        self.object_index.validate()
    }
}

/// How the object index is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObjectIndexStrategy {
    /// Counting pass, bucketed scatter, then per-object sort.
    #[default]
    MemoryEfficient,
    /// External sort of `(object, predicate, pos_y)` records.
    DiskSort,
}

/// Options for object and predicate index construction.
#[derive(Clone)]
pub struct ObjectIndexOptions {
    pub strategy: ObjectIndexStrategy,
    /// Store for spilled sort runs and disk-backed scratch sequences. A
    /// file-based store is created on demand when not set.
    pub temp_store: Option<Arc<dyn TemporaryFileStore>>,
    /// Backing storage of the finished index sequences.
    pub index_storage: SequenceStorage,
    pub spool: SpoolOptions,
    /// Positions buffered per `set_many` call when filling index sequences.
    pub batch_size: usize,
    /// Hand scatter batches to a dedicated writer thread.
    pub pipeline: bool,
    /// Batch buffers circulating between producer and writer.
    pub pipeline_depth: usize,
    /// Threads of the per-object sort pool; 0 picks the available parallelism.
    pub sort_threads: usize,
    /// Index slots covered by one parallel sort task.
    pub parallel_sort_batch: u64,
    /// Records held in memory per external-sort run.
    pub run_length: usize,
    /// Wait applied to every blocking queue operation before re-checking for
    /// failures.
    pub poll_timeout: Duration,
    pub build_predicate_index: bool,
}

impl Default for ObjectIndexOptions {
    fn default() -> Self {
        ObjectIndexOptions {
            strategy: ObjectIndexStrategy::default(),
            temp_store: None,
            index_storage: SequenceStorage::Memory,
            spool: SpoolOptions::default(),
            batch_size: 1 << 16,
            pipeline: true,
            pipeline_depth: 4,
            sort_threads: 0,
            parallel_sort_batch: 1 << 20,
            run_length: 1 << 20,
            poll_timeout: Duration::from_millis(50),
            build_predicate_index: true,
        }
    }
}

impl std::fmt::Debug for ObjectIndexOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectIndexOptions")
            .field("strategy", &self.strategy)
            .field("temp_store", &self.temp_store.is_some())
            .field("index_storage", &self.index_storage)
            .field("spool", &self.spool)
            .field("batch_size", &self.batch_size)
            .field("pipeline", &self.pipeline)
            .field("pipeline_depth", &self.pipeline_depth)
            .field("sort_threads", &self.sort_threads)
            .field("parallel_sort_batch", &self.parallel_sort_batch)
            .field("run_length", &self.run_length)
            .field("poll_timeout", &self.poll_timeout)
            .field("build_predicate_index", &self.build_predicate_index)
            .finish()
    }
}

impl ObjectIndexOptions {
    pub fn validate(&self) -> Result<()> {
        verify_arg!(batch_size, self.batch_size > 0);
        verify_arg!(pipeline_depth, self.pipeline_depth >= 2);
        verify_arg!(parallel_sort_batch, self.parallel_sort_batch > 0);
        verify_arg!(run_length, self.run_length > 0);
        verify_arg!(poll_timeout, !self.poll_timeout.is_zero());
        self.spool.validate()
    }

    /// The configured temp store, or a file-based one under the spool
    /// directory (the system temp dir when unset).
    pub fn resolve_temp_store(&self) -> Result<Arc<dyn TemporaryFileStore>> {
        match &self.temp_store {
            Some(store) => Ok(store.clone()),
            None => hdt_io_impl::temp_file_store::create_file_based(
                u64::MAX,
                self.spool.directory.as_deref(),
            )
            .map_err(|e| Error::io("create temp file store", e)),
        }
    }

    /// Number of threads for the sort pool.
    pub fn effective_sort_threads(&self) -> usize {
        if self.sort_threads != 0 {
            return self.sort_threads;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}

/// Options of a [`crate::spool::BucketedSpool`].
#[derive(Debug, Clone)]
pub struct SpoolOptions {
    /// Target slots per bucket file.
    pub bucket_size: u64,
    /// Records buffered per batch before they are flushed as chunks.
    pub buffer_records: usize,
    pub codec: ChunkCodec,
    /// Parent of the private spool directory; the system temp dir when unset.
    pub directory: Option<PathBuf>,
}

impl Default for SpoolOptions {
    fn default() -> Self {
        SpoolOptions {
            bucket_size: 1 << 22,
            buffer_records: 1 << 16,
            codec: ChunkCodec::Lz4,
            directory: None,
        }
    }
}

impl SpoolOptions {
    pub fn validate(&self) -> Result<()> {
        verify_arg!(bucket_size, self.bucket_size > 0);
        if self.bucket_size > MAX_BUCKET_SIZE {
            return Err(Error::resource_exhausted(
                "spool bucket offsets",
                self.bucket_size,
                MAX_BUCKET_SIZE,
            ));
        }
        verify_arg!(buffer_records, self.buffer_records > 0);
        if self.buffer_records > MAX_BUFFER_RECORDS {
            return Err(Error::resource_exhausted(
                "spool batch records",
                self.buffer_records as u64,
                MAX_BUFFER_RECORDS as u64,
            ));
        }
        self.codec.validate()
    }
}
