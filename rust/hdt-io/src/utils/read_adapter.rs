//! A helper that turns any `ReadAt` implementation into a standard `std::io::Read`.

use crate::ReadAt;

/// Sequential `std::io::Read` and `std::io::Seek` over a `ReadAt` source.
///
/// The adapter keeps its own position; the size of the source is fetched once
/// and cached.
pub struct ReadAdapter<R> {
    inner: R,
    pos: u64,
    size: Option<u64>,
}

impl<R> ReadAdapter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pos: 0,
            size: None,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: ReadAt> ReadAdapter<R> {
    fn size(&mut self) -> std::io::Result<u64> {
        match self.size {
            Some(size) => Ok(size),
            None => {
                let size = self.inner.size()?;
                self.size = Some(size);
                Ok(size)
            }
        }
    }
}

impl<R: ReadAt> std::io::Read for ReadAdapter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let size = self.size()?;
        if self.pos >= size {
            return Ok(0);
        }
        let to_read = std::cmp::min(buf.len() as u64, size - self.pos) as usize;
        self.inner.read_exact_at(self.pos, &mut buf[..to_read])?;
        self.pos += to_read as u64;
        Ok(to_read)
    }
}

impl<R: ReadAt> std::io::Seek for ReadAdapter<R> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        use std::io::SeekFrom;

        let size = self.size()?;
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::End(offset) => size.saturating_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.saturating_add_signed(offset),
        };
        self.pos = new_pos;
        Ok(new_pos)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom};

    use super::ReadAdapter;

    #[test]
    fn test_sequential_reads() {
        let data: Vec<u8> = (0u8..100).collect();
        let mut adapter = ReadAdapter::new(data);
        let mut buf = [0u8; 30];
        assert_eq!(adapter.read(&mut buf).unwrap(), 30);
        assert_eq!(buf[29], 29);
        let mut rest = Vec::new();
        adapter.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.len(), 70);
        assert_eq!(rest[0], 30);
        assert_eq!(adapter.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek() {
        let data: Vec<u8> = (0u8..16).collect();
        let mut adapter = ReadAdapter::new(data);
        assert_eq!(adapter.seek(SeekFrom::End(-4)).unwrap(), 12);
        let mut buf = [0u8; 8];
        assert_eq!(adapter.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[12, 13, 14, 15]);
        adapter.seek(SeekFrom::Start(2)).unwrap();
        adapter.seek(SeekFrom::Current(1)).unwrap();
        assert_eq!(adapter.position(), 3);
    }
}
