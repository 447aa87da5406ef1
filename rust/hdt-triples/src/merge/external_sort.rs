use std::{cmp::Ordering, io::Write, sync::Arc, time::Instant};

use bytemuck::Pod;
use hdt_common::{Result, error::Error};
use hdt_io::{TemporaryFileStore, TemporaryWritable};
use rayon::slice::ParallelSliceMut;

use super::{LoserTree, MergeSource, RunReader, VecSource};

/// A sorted stream produced by [`ExternalSorter::finish`].
pub type SortedRuns<T, C> = LoserTree<Box<dyn MergeSource<Item = T> + Send>, C>;

/// Sorts fixed-width records that may not fit in memory.
///
/// Records are buffered up to `run_length`, each full buffer is stably
/// sorted and spilled as a run to the temporary store, and `finish` merges
/// the runs with a [`LoserTree`]. Records comparing equal keep their push
/// order.
pub struct ExternalSorter<T: Pod, C> {
    store: Arc<dyn TemporaryFileStore>,
    run_length: usize,
    buffer: Vec<T>,
    runs: Vec<SpilledRun>,
    cmp: C,
    total: u64,
}

struct SpilledRun {
    writable: Box<dyn TemporaryWritable>,
    count: u64,
}

impl<T, C> ExternalSorter<T, C>
where
    T: Pod + Send,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    pub fn new(store: Arc<dyn TemporaryFileStore>, run_length: usize, cmp: C) -> Self {
        let run_length = run_length.max(1);
        ExternalSorter {
            store,
            run_length,
            buffer: Vec::with_capacity(run_length.min(1 << 16)),
            runs: Vec::new(),
            cmp,
            total: 0,
        }
    }

    /// Records pushed so far.
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Runs spilled so far.
    pub fn spilled_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn push(&mut self, record: T) -> Result<()> {
        self.buffer.push(record);
        self.total += 1;
        if self.buffer.len() >= self.run_length {
            self.spill()?;
        }
        Ok(())
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, records: I) -> Result<()> {
        for record in records {
            self.push(record)?;
        }
        Ok(())
    }

    /// Merges everything pushed into one sorted stream.
    pub fn finish(mut self) -> Result<SortedRuns<T, C>> {
        let started = Instant::now();
        self.sort_buffer();
        let mut sources: Vec<Box<dyn MergeSource<Item = T> + Send>> =
            Vec::with_capacity(self.runs.len() + 1);
        for run in self.runs.drain(..) {
            let reader = run
                .writable
                .into_reader()
                .map_err(|e| Error::io("reopen sort run", e))?;
            sources.push(Box::new(RunReader::<T>::new(reader, run.count)?));
        }
        let tail = std::mem::take(&mut self.buffer);
        if !tail.is_empty() {
            sources.push(Box::new(VecSource::new(tail)));
        }
        log::debug!(
            "external sort: merging {} records from {} sources (opened in {:?})",
            self.total,
            sources.len(),
            started.elapsed()
        );
        Ok(LoserTree::new(sources, self.cmp))
    }

    fn sort_buffer(&mut self) {
        let cmp = &self.cmp;
        self.buffer.par_sort_by(|a, b| cmp(a, b));
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        self.sort_buffer();
        let bytes: &[u8] = bytemuck::cast_slice(&self.buffer);
        let mut writable = self
            .store
            .allocate_writable(Some(bytes.len()))
            .map_err(|e| Error::io("allocate sort run", e))?;
        writable
            .write_all(bytes)
            .and_then(|_| writable.flush())
            .map_err(|e| Error::io("write sort run", e))?;
        let count = self.buffer.len() as u64;
        self.runs.push(SpilledRun { writable, count });
        self.buffer.clear();
        log::debug!(
            "external sort: spilled run {} of {count} records in {:?}",
            self.runs.len(),
            started.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<dyn TemporaryFileStore> {
        hdt_io_impl::temp_file_store::create_in_memory(1 << 30).unwrap()
    }

    #[test]
    fn test_sort_with_spills() {
        let mut rng = fastrand::Rng::with_seed(29);
        let records: Vec<[u64; 2]> = (0..10_000).map(|i| [rng.u64(0..500), i]).collect();
        let mut sorter = ExternalSorter::new(store(), 777, |a: &[u64; 2], b: &[u64; 2]| a[0].cmp(&b[0]));
        sorter.extend(records.iter().copied()).unwrap();
        assert_eq!(sorter.spilled_runs(), 10_000 / 777);
        let merged = sorter.finish().unwrap();
        assert_eq!(merged.total_len(), Some(10_000));
        let sorted = merged.collect::<Result<Vec<_>>>().unwrap();

        let mut expected = records;
        expected.sort_by_key(|r| r[0]);
        // Stable: ties keep push order, which the second field records.
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_sort_in_memory_only() {
        let mut sorter = ExternalSorter::new(store(), 100, |a: &u64, b: &u64| a.cmp(b));
        sorter.extend([5u64, 3, 9, 1]).unwrap();
        assert_eq!(sorter.spilled_runs(), 0);
        let sorted = sorter.finish().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(sorted, vec![1, 3, 5, 9]);

        let sorter = ExternalSorter::new(store(), 100, |a: &u64, b: &u64| a.cmp(b));
        assert!(sorter.is_empty());
        assert_eq!(sorter.finish().unwrap().count(), 0);
    }
}
