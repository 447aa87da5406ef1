use std::sync::Arc;

use hdt_common::{Result, error::Error};
use hdt_io::{TemporaryBuffer, TemporaryFileStore};

/// Where the words of a sequence live.
#[derive(Clone, Default)]
pub enum SequenceStorage {
    #[default]
    Memory,
    /// Words are kept in a temporary buffer of the given store and released
    /// when the sequence is dropped.
    Disk(Arc<dyn TemporaryFileStore>),
}

impl std::fmt::Debug for SequenceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceStorage::Memory => write!(f, "Memory"),
            SequenceStorage::Disk(store) => {
                write!(f, "Disk(available: {})", store.available_space())
            }
        }
    }
}

impl SequenceStorage {
    pub fn is_disk(&self) -> bool {
        matches!(self, SequenceStorage::Disk(_))
    }

    /// Creates a zero-filled word store of `words` words.
    pub fn create_words(&self, words: usize) -> Result<Box<dyn WordStore>> {
        match self {
            SequenceStorage::Memory => Ok(Box::new(MemoryWords::new(words))),
            SequenceStorage::Disk(store) => Ok(Box::new(DiskWords::new(store.as_ref(), words)?)),
        }
    }
}

/// Word-granular storage behind a [`crate::BitPackedSequence`].
pub trait WordStore: Send + Sync {
    /// Number of words.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grows (zero-filled) or shrinks the store to `words` words.
    fn resize(&mut self, words: usize) -> Result<()>;

    fn read_words(&self, start: usize, out: &mut [u64]) -> Result<()>;

    fn write_words(&mut self, start: usize, words: &[u64]) -> Result<()>;

    fn read_word(&self, index: usize) -> Result<u64> {
        let mut word = [0u64; 1];
        self.read_words(index, &mut word)?;
        Ok(word[0])
    }

    /// Direct access for memory-resident stores.
    fn as_slice(&self) -> Option<&[u64]> {
        None
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u64]> {
        None
    }

    fn size_in_bytes(&self) -> usize {
        self.len() * 8
    }
}

pub struct MemoryWords(Vec<u64>);

impl MemoryWords {
    pub fn new(words: usize) -> MemoryWords {
        MemoryWords(vec![0; words])
    }
}

impl WordStore for MemoryWords {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn resize(&mut self, words: usize) -> Result<()> {
        let shrinking = words < self.0.len();
        self.0.resize(words, 0);
        if shrinking {
            self.0.shrink_to_fit();
        }
        Ok(())
    }

    fn read_words(&self, start: usize, out: &mut [u64]) -> Result<()> {
        let end = start + out.len();
        if end > self.0.len() {
            return Err(Error::out_of_range(end as u64, self.0.len() as u64));
        }
        out.copy_from_slice(&self.0[start..end]);
        Ok(())
    }

    fn write_words(&mut self, start: usize, words: &[u64]) -> Result<()> {
        let end = start + words.len();
        if end > self.0.len() {
            return Err(Error::out_of_range(end as u64, self.0.len() as u64));
        }
        self.0[start..end].copy_from_slice(words);
        Ok(())
    }

    fn as_slice(&self) -> Option<&[u64]> {
        Some(&self.0)
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u64]> {
        Some(&mut self.0)
    }
}

/// Words kept in a temporary buffer, in native byte order.
pub struct DiskWords {
    buffer: Box<dyn TemporaryBuffer>,
    words: usize,
}

impl DiskWords {
    pub fn new(store: &dyn TemporaryFileStore, words: usize) -> Result<DiskWords> {
        let buffer = store
            .allocate_buffer(Some(words * 8))
            .map_err(|e| Error::io("allocate sequence buffer", e))?;
        let mut disk = DiskWords { buffer, words: 0 };
        disk.resize(words)?;
        Ok(disk)
    }
}

impl WordStore for DiskWords {
    fn len(&self) -> usize {
        self.words
    }

    fn resize(&mut self, words: usize) -> Result<()> {
        if words < self.words {
            self.buffer
                .truncate(words as u64 * 8)
                .map_err(|e| Error::io("shrink sequence buffer", e))?;
        } else if words > self.words {
            const ZERO_CHUNK: usize = 8192;
            let zeros = vec![0u64; ZERO_CHUNK.min(words - self.words)];
            let mut pos = self.words;
            while pos < words {
                let n = ZERO_CHUNK.min(words - pos);
                self.buffer
                    .write_at(pos as u64 * 8, bytemuck::cast_slice(&zeros[..n]))
                    .map_err(|e| Error::io("grow sequence buffer", e))?;
                pos += n;
            }
        }
        self.words = words;
        Ok(())
    }

    fn read_words(&self, start: usize, out: &mut [u64]) -> Result<()> {
        let end = start + out.len();
        if end > self.words {
            return Err(Error::out_of_range(end as u64, self.words as u64));
        }
        self.buffer
            .read_exact_at(start as u64 * 8, bytemuck::cast_slice_mut(out))
            .map_err(|e| {
                Error::io(
                    format!("read words {start}..{end} of {}", self.words),
                    e,
                )
            })
    }

    fn write_words(&mut self, start: usize, words: &[u64]) -> Result<()> {
        let end = start + words.len();
        if end > self.words {
            return Err(Error::out_of_range(end as u64, self.words as u64));
        }
        self.buffer
            .write_at(start as u64 * 8, bytemuck::cast_slice(words))
            .map_err(|e| Error::io(format!("write words {start}..{end}"), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_store(mut store: Box<dyn WordStore>) {
        assert_eq!(store.len(), 4);
        store.write_words(1, &[10, 20]).unwrap();
        assert_eq!(store.read_word(2).unwrap(), 20);
        store.resize(10).unwrap();
        let mut out = [1u64; 10];
        store.read_words(0, &mut out).unwrap();
        assert_eq!(out, [0, 10, 20, 0, 0, 0, 0, 0, 0, 0]);
        store.resize(2).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.read_word(2).is_err());
        assert!(store.write_words(1, &[1, 2]).is_err());
    }

    #[test]
    fn test_memory_words() {
        check_store(SequenceStorage::Memory.create_words(4).unwrap());
    }

    #[test]
    fn test_disk_words() {
        let temp = hdt_io_impl::temp_file_store::create_file_based(1 << 20, None).unwrap();
        let storage = SequenceStorage::Disk(temp.clone());
        let store = storage.create_words(4).unwrap();
        assert!(store.as_slice().is_none());
        check_store(store);
        assert_eq!(temp.available_space(), 1 << 20);
    }
}
