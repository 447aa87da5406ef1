use std::{fs::File, io, ops::Range, path::Path, sync::Arc};

use hdt_io::{
    ReadAdapter, ReadAt,
    file::{file_read_at_exact, file_write_at},
    temp_file_store::{TemporaryBuffer, TemporaryFileStore, TemporaryWritable},
};

use crate::budget::{Allocation, Budget};

/// Scratch files (sort runs, disk-backed sequence words) in a private
/// `hdt-scratch-*` directory. The directory lives until the store and every
/// file it handed out are dropped.
#[derive(Clone)]
pub struct ScratchDirStore {
    dir: Arc<ScratchDir>,
}

struct ScratchDir {
    budget: Budget,
    path: tempfile::TempDir,
}

impl ScratchDirStore {
    pub fn new(capacity: u64, parent_path: Option<&Path>) -> io::Result<ScratchDirStore> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hdt-scratch-");
        let path = match parent_path {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(ScratchDirStore {
            dir: Arc::new(ScratchDir {
                budget: Budget::new(capacity),
                path,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path.path()
    }

    fn open(&self, size_hint: Option<usize>) -> io::Result<ScratchFile> {
        let mut allocation = self.dir.budget.allocate(0)?;
        allocation.ensure(size_hint.unwrap_or(0) as u64)?;
        allocation.shrink_to(0);
        Ok(ScratchFile {
            file: tempfile::tempfile_in(self.path())?,
            allocation,
            len: 0,
            cursor: 0,
            _dir: Arc::clone(&self.dir),
        })
    }
}

impl TemporaryFileStore for ScratchDirStore {
    fn allocate_writable(
        &self,
        size_hint: Option<usize>,
    ) -> io::Result<Box<dyn TemporaryWritable>> {
        Ok(Box::new(self.open(size_hint)?))
    }

    fn allocate_buffer(&self, size_hint: Option<usize>) -> io::Result<Box<dyn TemporaryBuffer>> {
        Ok(Box::new(self.open(size_hint)?))
    }

    fn available_space(&self) -> u64 {
        self.dir.budget.remaining()
    }
}

/// An unnamed file inside a [`ScratchDirStore`] directory, charged to the
/// store's budget up to its highest written byte.
pub struct ScratchFile {
    file: File,
    allocation: Allocation,
    len: u64,
    /// Append position of the `Write` impl.
    cursor: u64,
    _dir: Arc<ScratchDir>,
}

impl ScratchFile {
    fn check_bounds(&self, pos: u64, count: usize) -> io::Result<()> {
        if pos.saturating_add(count as u64) > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "scratch file holds {} bytes, read of {count} at {pos}",
                    self.len
                ),
            ));
        }
        Ok(())
    }
}

impl io::Write for ScratchFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(self.cursor, buf)?;
        self.cursor += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ReadAt for ScratchFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn read_at(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        hdt_io::verify!(range.end >= range.start);
        let end = range.end.min(self.len);
        let mut bytes = vec![0u8; end.saturating_sub(range.start) as usize];
        if !bytes.is_empty() {
            file_read_at_exact(&self.file, range.start, &mut bytes)?;
        }
        Ok(bytes)
    }

    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        self.check_bounds(pos, buf.len())?;
        file_read_at_exact(&self.file, pos, buf)
    }
}

impl TemporaryWritable for ScratchFile {
    fn current_size(&self) -> u64 {
        self.len
    }

    fn truncate(&mut self, end_pos: u64) -> io::Result<()> {
        if end_pos >= self.len {
            return Ok(());
        }
        self.file.set_len(end_pos)?;
        self.allocation.shrink_to(end_pos);
        self.len = end_pos;
        self.cursor = self.cursor.min(end_pos);
        Ok(())
    }

    fn into_reader(self: Box<Self>) -> io::Result<Box<dyn io::Read + Send>> {
        Ok(Box::new(ReadAdapter::new(*self)))
    }
}

impl TemporaryBuffer for ScratchFile {
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let end = pos + buf.len() as u64;
        self.allocation.ensure(end)?;
        if let Err(e) = file_write_at(&self.file, pos, buf) {
            // Give back whatever the failed write grew.
            let _ = self.file.set_len(self.len);
            self.allocation.shrink_to(self.len);
            return Err(e);
        }
        self.len = self.len.max(end);
        Ok(())
    }
}
