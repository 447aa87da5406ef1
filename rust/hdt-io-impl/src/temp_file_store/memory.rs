use std::{io, ops::Range};

use hdt_io::{
    ReadAdapter, ReadAt,
    temp_file_store::{TemporaryBuffer, TemporaryFileStore, TemporaryWritable},
};

use crate::budget::{Allocation, Budget};

/// Temporary "files" held in process memory, bounded by the same kind of
/// budget as the file-based store.
pub struct InMemoryTempFileStore {
    budget: Budget,
}

impl InMemoryTempFileStore {
    pub fn new(capacity: u64) -> InMemoryTempFileStore {
        InMemoryTempFileStore {
            budget: Budget::new(capacity),
        }
    }

    fn create_buffer(&self, size_hint: Option<usize>) -> io::Result<MemoryTempBuffer> {
        let size_hint = size_hint.unwrap_or(0);
        let allocation = self.budget.allocate(0)?;
        Ok(MemoryTempBuffer {
            allocation,
            data: Vec::with_capacity(size_hint.min(16 * 1024 * 1024)),
            pos: 0,
        })
    }
}

impl TemporaryFileStore for InMemoryTempFileStore {
    fn allocate_writable(
        &self,
        size_hint: Option<usize>,
    ) -> io::Result<Box<dyn TemporaryWritable>> {
        self.create_buffer(size_hint).map(|b| Box::new(b) as _)
    }

    fn allocate_buffer(&self, size_hint: Option<usize>) -> io::Result<Box<dyn TemporaryBuffer>> {
        self.create_buffer(size_hint).map(|b| Box::new(b) as _)
    }

    fn available_space(&self) -> u64 {
        self.budget.remaining()
    }
}

pub struct MemoryTempBuffer {
    allocation: Allocation,
    data: Vec<u8>,
    pos: u64,
}

impl io::Write for MemoryTempBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(self.pos, buf)?;
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ReadAt for MemoryTempBuffer {
    fn size(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        self.data.read_at(range)
    }

    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = pos as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at {pos} past end of memory buffer ({} bytes)",
                    buf.len(),
                    self.data.len()
                ),
            ));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

impl TemporaryWritable for MemoryTempBuffer {
    fn current_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn truncate(&mut self, end_pos: u64) -> io::Result<()> {
        if end_pos < self.data.len() as u64 {
            self.data.truncate(end_pos as usize);
            self.allocation.shrink_to(end_pos);
            self.pos = std::cmp::min(self.pos, end_pos);
        }
        Ok(())
    }

    fn into_reader(self: Box<Self>) -> io::Result<Box<dyn io::Read + Send>> {
        Ok(Box::new(ReadAdapter::new(*self)))
    }
}

impl TemporaryBuffer for MemoryTempBuffer {
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let end_pos = pos + buf.len() as u64;
        self.allocation.ensure(end_pos)?;
        let (start, end) = (pos as usize, end_pos as usize);
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }
}
