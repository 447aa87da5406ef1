use std::io::Read;

use bytemuck::Pod;
use hdt_common::{Result, error::Error};

use super::MergeSource;

/// Records decoded per refill of a [`RunReader`].
const RUN_BUFFER_RECORDS: usize = 8192;

/// An in-memory sorted vector.
pub struct VecSource<T> {
    items: Vec<T>,
    pos: usize,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        VecSource { items, pos: 0 }
    }
}

impl<T> MergeSource for VecSource<T> {
    type Item = T;

    fn peek(&self) -> Option<&T> {
        self.items.get(self.pos)
    }

    fn advance(&mut self) -> Result<()> {
        if self.pos < self.items.len() {
            self.pos += 1;
        }
        Ok(())
    }

    fn remaining(&self) -> Option<u64> {
        Some((self.items.len() - self.pos) as u64)
    }
}

/// Adapts a fallible sorted iterator. The first error ends the stream and is
/// returned by the `advance` (or constructor) that hit it.
pub struct IterSource<T, I> {
    iter: I,
    head: Option<T>,
}

impl<T, I> IterSource<T, I>
where
    I: Iterator<Item = Result<T>>,
{
    pub fn new(mut iter: I) -> Result<Self> {
        let head = iter.next().transpose()?;
        Ok(IterSource { iter, head })
    }
}

impl<T, I> MergeSource for IterSource<T, I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = T;

    fn peek(&self) -> Option<&T> {
        self.head.as_ref()
    }

    fn advance(&mut self) -> Result<()> {
        if self.head.is_some() {
            self.head = None;
            self.head = self.iter.next().transpose()?;
        }
        Ok(())
    }

    fn remaining(&self) -> Option<u64> {
        let head = self.head.is_some() as u64;
        match self.iter.size_hint() {
            (lower, Some(upper)) if lower == upper => Some(lower as u64 + head),
            _ if self.head.is_none() => Some(0),
            _ => None,
        }
    }
}

/// Reads a run of fixed-width records written as raw native-endian bytes,
/// a buffer of records at a time.
pub struct RunReader<T: Pod> {
    reader: Box<dyn Read + Send>,
    unread: u64,
    buffer: Vec<T>,
    pos: usize,
}

impl<T: Pod> RunReader<T> {
    /// Opens a run of `count` records.
    pub fn new(reader: Box<dyn Read + Send>, count: u64) -> Result<Self> {
        let mut run = RunReader {
            reader,
            unread: count,
            buffer: Vec::new(),
            pos: 0,
        };
        run.refill()?;
        Ok(run)
    }

    fn refill(&mut self) -> Result<()> {
        let n = std::cmp::min(self.unread, RUN_BUFFER_RECORDS as u64) as usize;
        self.buffer.clear();
        self.buffer.resize(n, T::zeroed());
        self.pos = 0;
        if n > 0 {
            self.reader
                .read_exact(bytemuck::cast_slice_mut(&mut self.buffer))
                .map_err(|e| Error::io("read sort run", e))?;
            self.unread -= n as u64;
        }
        Ok(())
    }
}

impl<T: Pod> MergeSource for RunReader<T> {
    type Item = T;

    fn peek(&self) -> Option<&T> {
        self.buffer.get(self.pos)
    }

    fn advance(&mut self) -> Result<()> {
        if self.pos < self.buffer.len() {
            self.pos += 1;
            if self.pos == self.buffer.len() && self.unread > 0 {
                self.refill()?;
            }
        }
        Ok(())
    }

    fn remaining(&self) -> Option<u64> {
        Some((self.buffer.len() - self.pos) as u64 + self.unread)
    }
}
