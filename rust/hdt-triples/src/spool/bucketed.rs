use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use hdt_bits::BitmapBuilder;
use hdt_common::{Result, error::Error};
use hdt_sequence::BitPackedSequence;

use super::ChunkCodec;
use crate::options::SpoolOptions;

/// Bytes of one spool record: a 32-bit offset inside the bucket and a 64-bit
/// value, both little endian.
pub const RECORD_SIZE: usize = 12;

/// Bytes of a chunk header: uncompressed and compressed payload lengths.
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Geometry shared by a spool and its batches.
#[derive(Debug, Clone, Copy)]
struct SpoolLayout {
    target_len: u64,
    bucket_size: u64,
    codec: ChunkCodec,
}

impl SpoolLayout {
    fn bucket_count(&self) -> usize {
        self.target_len.div_ceil(self.bucket_size) as usize
    }

    fn bucket_range(&self, bucket: usize) -> (u64, u64) {
        let start = bucket as u64 * self.bucket_size;
        (start, std::cmp::min(self.target_len, start + self.bucket_size))
    }
}

/// Scatters `(slot, value)` writes over a dense target range `[0, N)` through
/// per-bucket files, so that random writes become sequential appends and a
/// final bucket-by-bucket pass.
///
/// Bucket files live in a private temporary directory removed on drop.
pub struct BucketedSpool {
    dir: tempfile::TempDir,
    layout: SpoolLayout,
    buffer_records: usize,
    writers: Vec<Option<BufWriter<File>>>,
    records_written: u64,
    bytes_written: u64,
}

impl BucketedSpool {
    /// Creates a spool for the target range `[0, target_len)`.
    pub fn new(target_len: u64, options: &SpoolOptions) -> Result<BucketedSpool> {
        options.validate()?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("hdt-spool-");
        let dir = match &options.directory {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::io("create spool directory", e))?;
        let layout = SpoolLayout {
            target_len,
            bucket_size: options.bucket_size,
            codec: options.codec,
        };
        let writers = std::iter::repeat_with(|| None)
            .take(layout.bucket_count())
            .collect();
        Ok(BucketedSpool {
            dir,
            layout,
            buffer_records: options.buffer_records,
            writers,
            records_written: 0,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target_len(&self) -> u64 {
        self.layout.target_len
    }

    pub fn bucket_count(&self) -> usize {
        self.layout.bucket_count()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Path of the file holding bucket `bucket`.
    pub fn bucket_path(&self, bucket: usize) -> PathBuf {
        bucket_file(self.dir.path(), bucket)
    }

    /// An empty batch sized by the spool options.
    pub fn new_batch(&self) -> SpoolBatch {
        SpoolBatch::new(self.layout, self.buffer_records)
    }

    /// Appends the chunks of `batch` to their bucket files and clears it.
    /// An unprepared batch is prepared first.
    pub fn write_batch(&mut self, batch: &mut SpoolBatch) -> Result<()> {
        if !batch.prepared {
            batch.prepare()?;
        }
        for chunk in &batch.chunks {
            let writer = match &mut self.writers[chunk.bucket] {
                Some(writer) => writer,
                slot => {
                    let path = bucket_file(self.dir.path(), chunk.bucket);
                    let file = File::create(&path)
                        .map_err(|e| Error::io(format!("create {}", path.display()), e))?;
                    slot.insert(BufWriter::new(file))
                }
            };
            let payload = &batch.encoded[chunk.encoded.clone()];
            let mut header = [0u8; CHUNK_HEADER_SIZE];
            header[..4].copy_from_slice(&chunk.uncompressed_len.to_le_bytes());
            header[4..].copy_from_slice(&chunk_len(payload.len())?.to_le_bytes());
            writer
                .write_all(&header)
                .and_then(|_| writer.write_all(payload))
                .map_err(|e| Error::io(format!("append chunk to bucket {}", chunk.bucket), e))?;
            self.bytes_written += (CHUNK_HEADER_SIZE + payload.len()) as u64;
        }
        self.records_written += batch.records.len() as u64;
        batch.clear();
        Ok(())
    }

    /// Rebuilds the dense target array bucket by bucket and writes it into
    /// `dest` at positions `[0, N)`.
    ///
    /// Fails when a slot was written twice or never, when an offset falls
    /// outside its bucket, or when a bucket file is missing or truncated.
    pub fn materialize(mut self, dest: &mut BitPackedSequence) -> Result<()> {
        let started = Instant::now();
        for (bucket, writer) in self.writers.iter_mut().enumerate() {
            if let Some(mut writer) = writer.take() {
                writer
                    .flush()
                    .map_err(|e| Error::io(format!("flush bucket {bucket}"), e))?;
            }
        }
        log::debug!(
            "spool: materializing {} records ({} bytes) from {} buckets",
            self.records_written,
            self.bytes_written,
            self.bucket_count()
        );
        let mut raw = Vec::new();
        let mut dense = Vec::new();
        for bucket in 0..self.bucket_count() {
            let (start, end) = self.layout.bucket_range(bucket);
            let len = (end - start) as usize;
            let path = self.bucket_path(bucket);
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::io_corrupted(format!(
                        "missing bucket file {} for slots {start}..{end}",
                        path.display()
                    )));
                }
                Err(e) => return Err(Error::io(format!("read {}", path.display()), e)),
            };
            dense.clear();
            dense.resize(len, 0u64);
            let mut written = BitmapBuilder::with_len(len as u64);
            let mut filled = 0usize;
            let mut pos = 0usize;
            while pos < bytes.len() {
                if bytes.len() - pos < CHUNK_HEADER_SIZE {
                    return Err(Error::io_corrupted(format!(
                        "truncated chunk header in bucket {bucket} at byte {pos}: {} of {CHUNK_HEADER_SIZE} bytes",
                        bytes.len() - pos
                    )));
                }
                let uncompressed = read_u32(&bytes[pos..]) as usize;
                let compressed = read_u32(&bytes[pos + 4..]) as usize;
                pos += CHUNK_HEADER_SIZE;
                if bytes.len() - pos < compressed {
                    return Err(Error::io_corrupted(format!(
                        "truncated chunk payload in bucket {bucket}: expected {compressed} bytes, found {}",
                        bytes.len() - pos
                    )));
                }
                if uncompressed % RECORD_SIZE != 0 {
                    return Err(Error::io_corrupted(format!(
                        "chunk of {uncompressed} bytes in bucket {bucket} is not a multiple of {RECORD_SIZE}"
                    )));
                }
                raw.clear();
                self.layout
                    .codec
                    .decode(&bytes[pos..pos + compressed], uncompressed, &mut raw)?;
                pos += compressed;
                for record in raw.chunks_exact(RECORD_SIZE) {
                    let offset = read_u32(record) as usize;
                    let value = u64::from_le_bytes(
                        record[4..RECORD_SIZE]
                            .try_into()
                            .map_err(|_| Error::io_corrupted("spool record"))?,
                    );
                    if offset >= len {
                        return Err(Error::io_corrupted(format!(
                            "offset {offset} out of range for bucket {bucket} of {len} slots"
                        )));
                    }
                    if written.get(offset as u64) {
                        return Err(Error::io_corrupted(format!(
                            "slot {} written twice (bucket {bucket}, offset {offset})",
                            start + offset as u64
                        )));
                    }
                    written.set(offset as u64, true);
                    dense[offset] = value;
                    filled += 1;
                }
            }
            if filled != len {
                let missing = (0..len as u64).find(|&i| !written.get(i)).unwrap_or(0);
                return Err(Error::io_corrupted(format!(
                    "slot {} never written: bucket {bucket} holds {filled} of {len} slots",
                    start + missing
                )));
            }
            dest.set_range(start, &dense)?;
            std::fs::remove_file(&path)
                .map_err(|e| Error::io(format!("remove {}", path.display()), e))?;
            log::trace!("spool: bucket {bucket} materialized ({len} slots, {} bytes)", bytes.len());
        }
        log::debug!("spool: materialized in {:?}", started.elapsed());
        Ok(())
    }
}

fn bucket_file(dir: &Path, bucket: usize) -> PathBuf {
    dir.join(format!("bucket-{bucket:06}.spool"))
}

/// Length of a chunk payload as stored in its header.
fn chunk_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::resource_exhausted("spool chunk bytes", len as u64, u32::MAX as u64))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// A reusable buffer of `(slot, value)` writes destined for a spool.
///
/// `prepare` groups the records by bucket (counting sort, preserving push
/// order within a bucket) and encodes one chunk per touched bucket. It runs
/// on the producer side so the spool writer only appends bytes.
pub struct SpoolBatch {
    layout: SpoolLayout,
    capacity: usize,
    records: Vec<(u64, u64)>,
    prepared: bool,
    chunks: Vec<PreparedChunk>,
    encoded: Vec<u8>,
    bucket_counts: Vec<usize>,
    grouped: Vec<(u64, u64)>,
    raw: Vec<u8>,
}

struct PreparedChunk {
    bucket: usize,
    uncompressed_len: u32,
    encoded: std::ops::Range<usize>,
}

impl SpoolBatch {
    fn new(layout: SpoolLayout, capacity: usize) -> SpoolBatch {
        SpoolBatch {
            layout,
            capacity,
            records: Vec::with_capacity(capacity),
            prepared: false,
            chunks: Vec::new(),
            encoded: Vec::new(),
            bucket_counts: Vec::new(),
            grouped: Vec::new(),
            raw: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Buffers one write; fails with `OutOfRange` for a slot outside the
    /// target range.
    pub fn push(&mut self, slot: u64, value: u64) -> Result<()> {
        if slot >= self.layout.target_len {
            return Err(Error::out_of_range(slot, self.layout.target_len));
        }
        self.prepared = false;
        self.records.push((slot, value));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.chunks.clear();
        self.encoded.clear();
        self.prepared = false;
    }

    /// Groups the buffered records by bucket and encodes their chunks.
    pub fn prepare(&mut self) -> Result<()> {
        self.chunks.clear();
        self.encoded.clear();
        let bucket_size = self.layout.bucket_size;
        self.bucket_counts.clear();
        self.bucket_counts.resize(self.layout.bucket_count() + 1, 0);
        for &(slot, _) in &self.records {
            self.bucket_counts[(slot / bucket_size) as usize + 1] += 1;
        }
        for b in 1..self.bucket_counts.len() {
            self.bucket_counts[b] += self.bucket_counts[b - 1];
        }
        self.grouped.clear();
        self.grouped.resize(self.records.len(), (0, 0));
        let mut next = self.bucket_counts.clone();
        for &record in &self.records {
            let b = (record.0 / bucket_size) as usize;
            self.grouped[next[b]] = record;
            next[b] += 1;
        }
        for bucket in 0..self.layout.bucket_count() {
            let (lo, hi) = (self.bucket_counts[bucket], self.bucket_counts[bucket + 1]);
            if lo == hi {
                continue;
            }
            let base = bucket as u64 * bucket_size;
            self.raw.clear();
            for &(slot, value) in &self.grouped[lo..hi] {
                self.raw.extend_from_slice(&((slot - base) as u32).to_le_bytes());
                self.raw.extend_from_slice(&value.to_le_bytes());
            }
            let uncompressed_len = chunk_len(self.raw.len())?;
            let start = self.encoded.len();
            self.layout.codec.encode(&self.raw, &mut self.encoded)?;
            self.chunks.push(PreparedChunk {
                bucket,
                uncompressed_len,
                encoded: start..self.encoded.len(),
            });
        }
        self.prepared = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdt_sequence::SequenceStorage;

    fn options(bucket_size: u64, codec: ChunkCodec) -> SpoolOptions {
        SpoolOptions {
            bucket_size,
            buffer_records: 64,
            codec,
            directory: None,
        }
    }

    fn fill(spool: &mut BucketedSpool, writes: &[(u64, u64)]) {
        let mut batch = spool.new_batch();
        for &(slot, value) in writes {
            batch.push(slot, value).unwrap();
            if batch.is_full() {
                spool.write_batch(&mut batch).unwrap();
            }
        }
        spool.write_batch(&mut batch).unwrap();
    }

    #[test]
    fn test_permutation_round_trip() {
        let n = 1000u64;
        let mut rng = fastrand::Rng::with_seed(8);
        let mut slots: Vec<u64> = (0..n).collect();
        rng.shuffle(&mut slots);
        let writes: Vec<(u64, u64)> = slots.iter().map(|&s| (s, s * 3 + 1)).collect();
        for codec in [ChunkCodec::Plain, ChunkCodec::Lz4, ChunkCodec::Zstd { level: 1 }] {
            let mut spool = BucketedSpool::new(n, &options(97, codec)).unwrap();
            assert_eq!(spool.bucket_count(), 11);
            fill(&mut spool, &writes);
            let mut dest = BitPackedSequence::new(12, n, SequenceStorage::Memory).unwrap();
            spool.materialize(&mut dest).unwrap();
            let expected: Vec<u64> = (0..n).map(|s| s * 3 + 1).collect();
            assert_eq!(dest.to_vec().unwrap(), expected, "{codec:?}");
        }
    }

    #[test]
    fn test_missing_and_duplicate_slots_are_rejected() {
        let mut spool = BucketedSpool::new(10, &options(4, ChunkCodec::Lz4)).unwrap();
        fill(&mut spool, &[(0, 1), (1, 1), (2, 1), (3, 1), (4, 1), (5, 1), (6, 1), (8, 1), (9, 1)]);
        let mut dest = BitPackedSequence::new(4, 10, SequenceStorage::Memory).unwrap();
        let err = spool.materialize(&mut dest).unwrap_err();
        assert!(err.to_string().contains("slot 7 never written"), "{err}");

        let mut spool = BucketedSpool::new(4, &options(4, ChunkCodec::Plain)).unwrap();
        fill(&mut spool, &[(0, 1), (1, 1), (1, 2), (2, 1), (3, 1)]);
        let err = spool.materialize(&mut dest).unwrap_err();
        assert!(err.to_string().contains("written twice"), "{err}");
    }

    #[test]
    fn test_missing_bucket_file_is_reported() {
        let mut spool = BucketedSpool::new(8, &options(4, ChunkCodec::Plain)).unwrap();
        fill(&mut spool, &[(0, 1), (1, 1), (2, 1), (3, 1)]);
        let mut dest = BitPackedSequence::new(4, 8, SequenceStorage::Memory).unwrap();
        let err = spool.materialize(&mut dest).unwrap_err();
        assert!(err.to_string().contains("missing bucket file"), "{err}");
        assert!(!err.is_format_violation());
    }

    #[test]
    fn test_truncated_chunk_is_reported() {
        let mut spool = BucketedSpool::new(4, &options(4, ChunkCodec::Plain)).unwrap();
        fill(&mut spool, &[(0, 1), (1, 1), (2, 1), (3, 1)]);
        for writer in spool.writers.iter_mut() {
            drop(writer.take());
        }
        let path = spool.bucket_path(0);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        let mut dest = BitPackedSequence::new(4, 4, SequenceStorage::Memory).unwrap();
        let err = spool.materialize(&mut dest).unwrap_err();
        assert!(err.to_string().contains("truncated chunk payload"), "{err}");
    }

    #[test]
    fn test_out_of_range_slot_is_rejected() {
        let spool = BucketedSpool::new(4, &options(4, ChunkCodec::Plain)).unwrap();
        let mut batch = spool.new_batch();
        assert!(batch.push(4, 0).is_err());
        let path = spool.path().to_path_buf();
        assert!(path.exists());
        drop(spool);
        assert!(!path.exists());
    }
}
