//! Feeding a [`BucketedSpool`] either inline or through a writer thread.
//!
//! In the pipelined form the producer fills and prepares batches while a
//! single writer appends them to the bucket files. Batch buffers circulate
//! through two bounded queues (`free` and `ready`), so each buffer is owned by
//! exactly one side at a time. Every blocking queue operation waits at most
//! the poll timeout and then re-checks the shared failure cell; a `None`
//! message on `ready` tells the writer to stop.

use std::time::{Duration, Instant};

use hdt_common::{Result, error::Error};
use hdt_workflow::{
    FailureCell, SimpleMpmcQueue,
    simple_mpmc::{DequeueError, EnqueueTimeoutError},
};

use super::{BucketedSpool, SpoolBatch};

/// Receiver of scattered `(slot, value)` writes.
pub trait ScatterSink {
    fn push(&mut self, slot: u64, value: u64) -> Result<()>;
}

/// Writes batches on the calling thread.
pub struct DirectSink<'a> {
    spool: &'a mut BucketedSpool,
    batch: SpoolBatch,
}

impl<'a> DirectSink<'a> {
    pub fn new(spool: &'a mut BucketedSpool) -> Self {
        let batch = spool.new_batch();
        DirectSink { spool, batch }
    }

    /// Writes whatever is still buffered.
    pub fn finish(mut self) -> Result<()> {
        if !self.batch.is_empty() {
            self.spool.write_batch(&mut self.batch)?;
        }
        Ok(())
    }
}

impl ScatterSink for DirectSink<'_> {
    fn push(&mut self, slot: u64, value: u64) -> Result<()> {
        self.batch.push(slot, value)?;
        if self.batch.is_full() {
            self.spool.write_batch(&mut self.batch)?;
        }
        Ok(())
    }
}

/// Producer side of a pipelined spool.
pub struct PipelineSink<'q> {
    batch: Option<SpoolBatch>,
    free: &'q SimpleMpmcQueue<SpoolBatch>,
    ready: &'q SimpleMpmcQueue<Option<SpoolBatch>>,
    failure: &'q FailureCell,
    poll: Duration,
    submitted: u64,
}

impl PipelineSink<'_> {
    fn submit(&mut self) -> Result<()> {
        let Some(mut batch) = self.batch.take() else {
            return Ok(());
        };
        if batch.is_empty() {
            self.batch = Some(batch);
            return Ok(());
        }
        batch.prepare()?;
        self.send(Some(batch))?;
        self.submitted += 1;
        self.batch = Some(self.acquire()?);
        Ok(())
    }

    fn send(&self, mut message: Option<SpoolBatch>) -> Result<()> {
        loop {
            match self.ready.enqueue_timeout(message, self.poll) {
                Ok(()) => return Ok(()),
                Err(EnqueueTimeoutError::Timeout(m)) => {
                    if self.failure.is_set() {
                        return Err(writer_stopped());
                    }
                    message = m;
                }
                Err(EnqueueTimeoutError::Disconnected(_)) => return Err(writer_stopped()),
            }
        }
    }

    fn acquire(&self) -> Result<SpoolBatch> {
        loop {
            match self.free.dequeue_timeout(self.poll) {
                Ok(batch) => return Ok(batch),
                Err(DequeueError::Timeout) => {
                    if self.failure.is_set() {
                        return Err(writer_stopped());
                    }
                }
                Err(DequeueError::Disconnected) => return Err(writer_stopped()),
            }
        }
    }
}

impl ScatterSink for PipelineSink<'_> {
    fn push(&mut self, slot: u64, value: u64) -> Result<()> {
        let batch = match &mut self.batch {
            Some(batch) => batch,
            None => return Err(writer_stopped()),
        };
        batch.push(slot, value)?;
        if batch.is_full() {
            self.submit()?;
        }
        Ok(())
    }
}

fn writer_stopped() -> Error {
    Error::invalid_operation("spool writer stopped")
}

/// Runs `produce` against a sink whose batches are written to `spool` by a
/// dedicated writer thread.
///
/// `depth` batch buffers circulate between the two sides. The first error of
/// either side is returned after both have stopped.
pub fn run_pipelined<F>(
    spool: &mut BucketedSpool,
    depth: usize,
    poll: Duration,
    produce: F,
) -> Result<()>
where
    F: FnOnce(&mut PipelineSink<'_>) -> Result<()>,
{
    let depth = depth.max(2);
    let started = Instant::now();
    let free = SimpleMpmcQueue::new(depth);
    let ready = SimpleMpmcQueue::new(depth);
    let failure = FailureCell::new();
    let first = spool.new_batch();
    for _ in 1..depth {
        if free.enqueue(spool.new_batch()).is_err() {
            return Err(Error::invalid_operation("spool batch queue closed"));
        }
    }

    let submitted = std::thread::scope(|scope| {
        let writer = scope.spawn(|| write_batches(spool, &free, &ready, &failure, poll));

        let mut sink = PipelineSink {
            batch: Some(first),
            free: &free,
            ready: &ready,
            failure: &failure,
            poll,
            submitted: 0,
        };
        if let Err(e) = produce(&mut sink).and_then(|_| sink.submit()) {
            failure.set(e);
        }
        // Poison the writer; if it already stopped nothing is waiting.
        let _ = sink.send(None);
        ready.drop_producer();

        if writer.join().is_err() {
            failure.set(Error::invalid_operation("spool writer panicked"));
        }
        sink.submitted
    });
    failure.check()?;
    log::debug!(
        "spool: pipelined {submitted} batches ({} records) in {:?}",
        spool.records_written(),
        started.elapsed()
    );
    Ok(())
}

fn write_batches(
    spool: &mut BucketedSpool,
    free: &SimpleMpmcQueue<SpoolBatch>,
    ready: &SimpleMpmcQueue<Option<SpoolBatch>>,
    failure: &FailureCell,
    poll: Duration,
) {
    loop {
        match ready.dequeue_timeout(poll) {
            Ok(Some(mut batch)) => {
                if let Err(e) = spool.write_batch(&mut batch) {
                    failure.set(e);
                    break;
                }
                if free.enqueue(batch).is_err() {
                    break;
                }
            }
            Ok(None) | Err(DequeueError::Disconnected) => break,
            Err(DequeueError::Timeout) => {
                if failure.is_set() {
                    break;
                }
            }
        }
    }
    // Unblocks a producer waiting on either queue.
    ready.drop_consumer();
    free.drop_producer();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::SpoolOptions, spool::ChunkCodec};
    use hdt_sequence::{BitPackedSequence, SequenceStorage};

    fn spool(n: u64) -> BucketedSpool {
        let options = SpoolOptions {
            bucket_size: 100,
            buffer_records: 32,
            codec: ChunkCodec::Lz4,
            directory: None,
        };
        BucketedSpool::new(n, &options).unwrap()
    }

    #[test]
    fn test_pipelined_scatter() {
        let n = 5000u64;
        let mut spool = spool(n);
        run_pipelined(&mut spool, 3, Duration::from_millis(5), |sink| {
            for i in 0..n {
                sink.push((i * 7919) % n, i)?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(spool.records_written(), n);
        let mut dest = BitPackedSequence::new(13, n, SequenceStorage::Memory).unwrap();
        spool.materialize(&mut dest).unwrap();
        for i in 0..n {
            assert_eq!(dest.get((i * 7919) % n).unwrap(), i);
        }
    }

    #[test]
    fn test_producer_error_is_returned() {
        let mut spool = spool(1000);
        let err = run_pipelined(&mut spool, 2, Duration::from_millis(5), |sink| {
            for i in 0..500 {
                sink.push(i, i)?;
            }
            Err(Error::invalid_arg("triples", "broken input"))
        })
        .unwrap_err();
        assert!(err.to_string().contains("broken input"), "{err}");
    }

    #[test]
    fn test_out_of_range_write_stops_pipeline() {
        let mut spool = spool(10);
        let err = run_pipelined(&mut spool, 2, Duration::from_millis(5), |sink| {
            sink.push(3, 1)?;
            sink.push(10, 1)
        })
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            hdt_common::error::ErrorKind::OutOfRange { index: 10, len: 10 }
        ));
    }

    #[test]
    fn test_writer_failure_stops_producer() {
        let mut spool = spool(100_000);
        std::fs::remove_dir_all(spool.path()).unwrap();
        let started = Instant::now();
        let mut pushed = 0u64;
        let err = run_pipelined(&mut spool, 2, Duration::from_millis(5), |sink| {
            for i in 0..100_000 {
                sink.push(i, i)?;
                pushed += 1;
            }
            Ok(())
        })
        .unwrap_err();
        assert!(
            matches!(err.kind(), hdt_common::error::ErrorKind::Io { .. }),
            "{err}"
        );
        assert!(pushed < 100_000);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_direct_sink() {
        let mut spool = spool(64);
        let mut sink = DirectSink::new(&mut spool);
        for i in (0..64).rev() {
            sink.push(i, 63 - i).unwrap();
        }
        sink.finish().unwrap();
        let mut dest = BitPackedSequence::new(6, 64, SequenceStorage::Memory).unwrap();
        spool.materialize(&mut dest).unwrap();
        assert_eq!(dest.get(0).unwrap(), 63);
        assert_eq!(dest.get(63).unwrap(), 0);
    }
}
