//! I/O abstractions shared by the index builders:
//! - `ReadAt`: positional reader over a file or buffer.
//! - `TemporaryFileStore`: budgeted scratch storage for disk-backed sequences,
//!   sorted runs and spool files.

use std::{ops::Range, sync::Arc};

pub mod file;
pub mod temp_file_store;
pub mod utils;

pub use temp_file_store::{TemporaryBuffer, TemporaryFileStore, TemporaryWritable};
pub use utils::read_adapter::ReadAdapter;

/// A trait representing a conceptual file or buffer that supports reading from arbitrary
/// positions.
pub trait ReadAt: Send + Sync + 'static {
    /// Returns the size of the underlying object.
    fn size(&self) -> std::io::Result<u64>;

    /// Reads a specified range of bytes from the object.
    ///
    /// **NOTE**: `read_at` should not return with a short read, unless end-of-file
    /// is encountered.
    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>>;

    /// Fills `buf` with the bytes starting at `pos`.
    ///
    /// Fails with `UnexpectedEof` when the object ends before `buf` is full.
    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let bytes = self.read_at(pos..pos + buf.len() as u64)?;
        if bytes.len() != buf.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "short read at {pos}: expected {} bytes, got {}",
                    buf.len(),
                    bytes.len()
                ),
            ));
        }
        buf.copy_from_slice(&bytes);
        Ok(())
    }
}

impl<T: ReadAt + ?Sized> ReadAt for Arc<T> {
    fn size(&self) -> std::io::Result<u64> {
        self.as_ref().size()
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        self.as_ref().read_at(range)
    }

    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.as_ref().read_exact_at(pos, buf)
    }
}

impl ReadAt for Vec<u8> {
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        crate::verify!(range.end >= range.start);
        let end = std::cmp::min(range.end, self.len() as u64) as usize;
        let start = std::cmp::min(range.start as usize, end);
        Ok(self[start..end].to_vec())
    }
}
