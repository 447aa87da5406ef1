use std::io::{Read, Write};

use hdt_bits::bits::{
    bits_needed, get_bits, le_bytes_to_words, low_mask, set_bits, words_for, words_to_le_bytes,
};
use hdt_common::{Result, error::Error, verify_arg};
use hdt_format::{PayloadReader, PayloadWriter, SequenceHeader};

use crate::storage::{SequenceStorage, WordStore};

/// Elements decoded per block by iteration, scans and repacking.
const BLOCK_VALUES: usize = 4096;

/// Words moved per chunk by `save` and `load`.
const IO_WORDS: usize = 8192;

/// A growable array of `bit_width`-bit unsigned integers packed across
/// 64-bit words.
///
/// `capacity` elements are always addressable (zero until written); `len` is
/// one past the highest position written so far.
pub struct BitPackedSequence {
    bit_width: u32,
    len: u64,
    capacity: u64,
    words: Box<dyn WordStore>,
    storage: SequenceStorage,
}

impl BitPackedSequence {
    /// Creates an empty sequence with room for `capacity` zero elements.
    ///
    /// # Arguments
    ///
    /// * `bit_width` - Bits per element, `0..=64`.
    /// * `capacity` - Number of elements addressable without growing.
    /// * `storage` - Memory or temporary-store backing for the words.
    pub fn new(bit_width: u32, capacity: u64, storage: SequenceStorage) -> Result<Self> {
        verify_arg!(bit_width, bit_width <= 64);
        let words = storage.create_words(words_for(bit_width, capacity))?;
        Ok(BitPackedSequence {
            bit_width,
            len: 0,
            capacity,
            words,
            storage,
        })
    }

    /// Creates a sequence of `len` zero elements.
    pub fn with_len(bit_width: u32, len: u64, storage: SequenceStorage) -> Result<Self> {
        let mut seq = Self::new(bit_width, len, storage)?;
        seq.len = len;
        Ok(seq)
    }

    /// Creates a sequence of the minimal width holding `values`.
    pub fn from_values(values: &[u64], storage: SequenceStorage) -> Result<Self> {
        let max = values.iter().copied().max().unwrap_or(0);
        let mut seq = Self::new(bits_needed(max), values.len() as u64, storage)?;
        seq.set_range(0, values)?;
        Ok(seq)
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn storage(&self) -> &SequenceStorage {
        &self.storage
    }

    /// Bytes held by the packed words.
    pub fn size_in_bytes(&self) -> usize {
        self.words.size_in_bytes()
    }

    /// Returns the element at `i`.
    ///
    /// Fails with `OutOfRange` if `i` is not below the capacity.
    pub fn get(&self, i: u64) -> Result<u64> {
        if i >= self.capacity {
            return Err(Error::out_of_range(i, self.capacity));
        }
        self.read_field(i)
    }

    /// Writes `value` at `i`, extending `len` to `i + 1` when needed.
    ///
    /// The value is validated before anything is modified.
    pub fn set(&mut self, i: u64, value: u64) -> Result<()> {
        self.check_value(value)?;
        if i >= self.capacity {
            return Err(Error::out_of_range(i, self.capacity));
        }
        self.write_field(i, value)?;
        if i >= self.len {
            self.len = i + 1;
        }
        Ok(())
    }

    /// Appends `value`, doubling the capacity when it is exhausted.
    pub fn append(&mut self, value: u64) -> Result<()> {
        self.check_value(value)?;
        if self.len == self.capacity {
            self.set_capacity(std::cmp::max(1, self.capacity.saturating_mul(2)))?;
        }
        self.write_field(self.len, value)?;
        self.len += 1;
        Ok(())
    }

    /// Makes positions below `len` addressable and readable, doubling the
    /// capacity until it covers them. Never shrinks.
    pub fn grow_to(&mut self, len: u64) -> Result<()> {
        if len > self.capacity {
            let mut capacity = std::cmp::max(1, self.capacity);
            while capacity < len {
                capacity = capacity.saturating_mul(2);
            }
            self.set_capacity(capacity)?;
        }
        self.len = std::cmp::max(self.len, len);
        Ok(())
    }

    /// Applies a batch of `(position, value)` writes.
    ///
    /// Pairs are stably sorted by position, so the last pair for a repeated
    /// position wins. For disk-backed words the touched words are coalesced
    /// into contiguous runs and each run is read, patched and written once.
    /// `scratch` is a caller-owned buffer reused across calls.
    ///
    /// Every pair is validated before any write happens.
    pub fn set_many(&mut self, pairs: &mut [(u64, u64)], scratch: &mut Vec<u64>) -> Result<()> {
        for &(i, value) in pairs.iter() {
            self.check_value(value)?;
            if i >= self.capacity {
                return Err(Error::out_of_range(i, self.capacity));
            }
        }
        if pairs.is_empty() {
            return Ok(());
        }
        pairs.sort_by_key(|p| p.0);
        let max_pos = pairs[pairs.len() - 1].0;

        let width = self.bit_width as u64;
        if width != 0 {
            if let Some(words) = self.words.as_mut_slice() {
                for &(i, value) in pairs.iter() {
                    set_bits(words, i * width, self.bit_width, value);
                }
            } else {
                let first_word = |i: u64| (i * width / 64) as usize;
                let last_word = |i: u64| ((i * width + width - 1) / 64) as usize;
                let mut k = 0;
                while k < pairs.len() {
                    let run_first = first_word(pairs[k].0);
                    let mut run_last = last_word(pairs[k].0);
                    let mut end = k + 1;
                    while end < pairs.len() && first_word(pairs[end].0) <= run_last + 1 {
                        run_last = std::cmp::max(run_last, last_word(pairs[end].0));
                        end += 1;
                    }
                    scratch.clear();
                    scratch.resize(run_last - run_first + 1, 0);
                    self.words.read_words(run_first, scratch)?;
                    let base = run_first as u64 * 64;
                    for &(i, value) in &pairs[k..end] {
                        set_bits(scratch, i * width - base, self.bit_width, value);
                    }
                    self.words.write_words(run_first, scratch)?;
                    k = end;
                }
            }
        }
        if max_pos >= self.len {
            self.len = max_pos + 1;
        }
        Ok(())
    }

    /// Writes `values` at consecutive positions starting at `start`.
    pub fn set_range(&mut self, start: u64, values: &[u64]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let end = start + values.len() as u64;
        if end > self.capacity {
            return Err(Error::out_of_range(end - 1, self.capacity));
        }
        for &value in values {
            self.check_value(value)?;
        }
        write_run(self.words.as_mut(), self.bit_width, start, values)?;
        if end > self.len {
            self.len = end;
        }
        Ok(())
    }

    /// Decodes the elements `[start, start + out.len())` into `out`.
    pub fn read_range(&self, start: u64, out: &mut [u64]) -> Result<()> {
        let end = start + out.len() as u64;
        if end > self.capacity {
            return Err(Error::out_of_range(end.saturating_sub(1), self.capacity));
        }
        read_run(self.words.as_ref(), self.bit_width, start, out)
    }

    pub fn iter(&self) -> SequenceIter<'_> {
        SequenceIter {
            seq: self,
            pos: 0,
            end: self.len,
            block: Vec::new(),
            block_pos: 0,
        }
    }

    pub fn to_vec(&self) -> Result<Vec<u64>> {
        self.iter().collect()
    }

    /// Largest element among the first `len`, or 0 for an empty sequence.
    pub fn max_value(&self) -> Result<u64> {
        let mut max = 0;
        for value in self.iter() {
            max = std::cmp::max(max, value?);
        }
        Ok(max)
    }

    /// Shrinks the words to exactly what `len` elements need.
    pub fn trim_to_size(&mut self) -> Result<()> {
        self.set_capacity(self.len)
    }

    /// Recomputes the minimal width for the current contents, repacks in place
    /// and shrinks the words.
    pub fn trim_bits_aggressive(&mut self) -> Result<()> {
        let max = self.max_value()?;
        self.repack(bits_needed(max))?;
        self.trim_to_size()
    }

    /// Changes the element width, moving every element to its new position in
    /// place. Narrowing fails with `ValueTooLarge` when an element does not fit.
    pub fn repack(&mut self, new_width: u32) -> Result<()> {
        verify_arg!(new_width, new_width <= 64);
        let old_width = self.bit_width;
        if new_width == old_width {
            return Ok(());
        }
        let n = self.len;
        let mut block = vec![0u64; BLOCK_VALUES.min(n as usize).max(1)];
        if new_width > old_width {
            self.words.resize(words_for(new_width, self.capacity))?;
            // Back to front: new positions never precede old ones.
            let mut end = n;
            while end > 0 {
                let start = end.saturating_sub(block.len() as u64);
                let chunk = &mut block[..(end - start) as usize];
                read_run(self.words.as_ref(), old_width, start, chunk)?;
                write_run(self.words.as_mut(), new_width, start, chunk)?;
                end = start;
            }
        } else {
            let max = self.max_value()?;
            if max > low_mask(new_width) {
                return Err(Error::value_too_large(max, new_width));
            }
            let mut start = 0;
            while start < n {
                let end = std::cmp::min(n, start + block.len() as u64);
                let chunk = &mut block[..(end - start) as usize];
                read_run(self.words.as_ref(), old_width, start, chunk)?;
                write_run(self.words.as_mut(), new_width, start, chunk)?;
                start = end;
            }
            self.words.resize(words_for(new_width, self.capacity))?;
            clear_tail(self.words.as_mut(), n * new_width as u64)?;
        }
        self.bit_width = new_width;
        log::trace!(
            "repacked {n} elements from {old_width} to {new_width} bits ({:?})",
            self.storage
        );
        Ok(())
    }

    /// Writes the log-sequence container.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header = SequenceHeader {
            bit_width: self.bit_width as u8,
            len: self.len,
        };
        header.write(writer)?;
        let payload_len = header.payload_len()?;
        let total_words = payload_len.div_ceil(8) as usize;
        let mut payload = PayloadWriter::new(writer);
        let mut words = vec![0u64; IO_WORDS.min(total_words)];
        let mut bytes = Vec::with_capacity(words.len() * 8);
        let mut remaining = payload_len as usize;
        let mut pos = 0;
        while pos < total_words {
            let n = IO_WORDS.min(total_words - pos);
            self.words.read_words(pos, &mut words[..n])?;
            let byte_len = remaining.min(n * 8);
            bytes.clear();
            words_to_le_bytes(&words[..n], byte_len, &mut bytes);
            payload.write_all(&bytes)?;
            remaining -= byte_len;
            pos += n;
        }
        payload.finish()?;
        Ok(())
    }

    /// Reads a log-sequence container into the given storage.
    pub fn load<R: Read>(reader: &mut R, storage: SequenceStorage) -> Result<Self> {
        let header = SequenceHeader::read(reader)?;
        let payload_len = header.payload_len()?;
        let mut seq = Self::with_len(header.bit_width as u32, header.len, storage)?;
        let mut payload = PayloadReader::new(reader, payload_len, "sequence");
        let mut bytes = vec![0u8; (IO_WORDS * 8).min(payload_len as usize)];
        let mut words = vec![0u64; IO_WORDS.min(payload_len.div_ceil(8) as usize)];
        let mut pos = 0;
        while payload.remaining() > 0 {
            let byte_len = (payload.remaining() as usize).min(bytes.len());
            payload.read_exact(&mut bytes[..byte_len])?;
            let n = byte_len.div_ceil(8);
            le_bytes_to_words(&bytes[..byte_len], &mut words[..n]);
            seq.words.write_words(pos, &words[..n])?;
            pos += n;
        }
        payload.finish()?;
        clear_tail(seq.words.as_mut(), seq.len * seq.bit_width as u64)?;
        Ok(seq)
    }

    fn check_value(&self, value: u64) -> Result<()> {
        if value > low_mask(self.bit_width) {
            return Err(Error::value_too_large(value, self.bit_width));
        }
        Ok(())
    }

    fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        self.words.resize(words_for(self.bit_width, capacity))?;
        self.capacity = capacity;
        Ok(())
    }

    fn read_field(&self, i: u64) -> Result<u64> {
        let width = self.bit_width;
        if width == 0 {
            return Ok(0);
        }
        let bit_pos = i * width as u64;
        if let Some(words) = self.words.as_slice() {
            return Ok(get_bits(words, bit_pos, width));
        }
        let first = (bit_pos / 64) as usize;
        let last = ((bit_pos + width as u64 - 1) / 64) as usize;
        let mut buf = [0u64; 2];
        self.words.read_words(first, &mut buf[..last - first + 1])?;
        Ok(get_bits(&buf, bit_pos % 64, width))
    }

    fn write_field(&mut self, i: u64, value: u64) -> Result<()> {
        let width = self.bit_width;
        if width == 0 {
            return Ok(());
        }
        let bit_pos = i * width as u64;
        if let Some(words) = self.words.as_mut_slice() {
            set_bits(words, bit_pos, width, value);
            return Ok(());
        }
        let first = (bit_pos / 64) as usize;
        let last = ((bit_pos + width as u64 - 1) / 64) as usize;
        let mut buf = [0u64; 2];
        let buf = &mut buf[..last - first + 1];
        self.words.read_words(first, buf)?;
        set_bits(buf, bit_pos % 64, width, value);
        self.words.write_words(first, buf)
    }
}

impl std::fmt::Debug for BitPackedSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitPackedSequence")
            .field("bit_width", &self.bit_width)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("storage", &self.storage)
            .finish()
    }
}

/// Decodes consecutive `width`-bit fields starting at element `start`.
fn read_run(words: &dyn WordStore, width: u32, start: u64, out: &mut [u64]) -> Result<()> {
    if width == 0 || out.is_empty() {
        out.fill(0);
        return Ok(());
    }
    let w = width as u64;
    let bit_start = start * w;
    if let Some(slice) = words.as_slice() {
        for (k, value) in out.iter_mut().enumerate() {
            *value = get_bits(slice, bit_start + k as u64 * w, width);
        }
        return Ok(());
    }
    let bit_end = bit_start + out.len() as u64 * w;
    let first = (bit_start / 64) as usize;
    let last = ((bit_end - 1) / 64) as usize;
    let mut buf = vec![0u64; last - first + 1];
    words.read_words(first, &mut buf)?;
    let base = bit_start - first as u64 * 64;
    for (k, value) in out.iter_mut().enumerate() {
        *value = get_bits(&buf, base + k as u64 * w, width);
    }
    Ok(())
}

/// Encodes `values` as consecutive `width`-bit fields starting at element
/// `start`. Only the partially covered boundary words are read back.
fn write_run(words: &mut dyn WordStore, width: u32, start: u64, values: &[u64]) -> Result<()> {
    if width == 0 || values.is_empty() {
        return Ok(());
    }
    let w = width as u64;
    let bit_start = start * w;
    if let Some(slice) = words.as_mut_slice() {
        for (k, &value) in values.iter().enumerate() {
            set_bits(slice, bit_start + k as u64 * w, width, value);
        }
        return Ok(());
    }
    let bit_end = bit_start + values.len() as u64 * w;
    let first = (bit_start / 64) as usize;
    let last = ((bit_end - 1) / 64) as usize;
    let mut buf = vec![0u64; last - first + 1];
    if bit_start % 64 != 0 {
        buf[0] = words.read_word(first)?;
    }
    if bit_end % 64 != 0 && (last != first || bit_start % 64 == 0) {
        buf[last - first] = words.read_word(last)?;
    }
    let base = bit_start - first as u64 * 64;
    for (k, &value) in values.iter().enumerate() {
        set_bits(&mut buf, base + k as u64 * w, width, value);
    }
    words.write_words(first, &buf)
}

/// Zeroes every bit at or above `bit_pos`.
fn clear_tail(words: &mut dyn WordStore, bit_pos: u64) -> Result<()> {
    let total = words.len();
    let mut first_whole = bit_pos.div_ceil(64) as usize;
    if bit_pos % 64 != 0 {
        let index = (bit_pos / 64) as usize;
        if index < total {
            let word = words.read_word(index)? & low_mask((bit_pos % 64) as u32);
            words.write_words(index, &[word])?;
        }
    }
    if first_whole < total {
        let zeros = vec![0u64; IO_WORDS.min(total - first_whole)];
        while first_whole < total {
            let n = zeros.len().min(total - first_whole);
            words.write_words(first_whole, &zeros[..n])?;
            first_whole += n;
        }
    }
    Ok(())
}

/// Iterator over the first `len` elements, decoding a block at a time.
pub struct SequenceIter<'a> {
    seq: &'a BitPackedSequence,
    pos: u64,
    end: u64,
    block: Vec<u64>,
    block_pos: usize,
}

impl Iterator for SequenceIter<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.block_pos == self.block.len() {
            if self.pos >= self.end {
                return None;
            }
            let n = std::cmp::min(BLOCK_VALUES as u64, self.end - self.pos) as usize;
            self.block.resize(n, 0);
            if let Err(e) = self.seq.read_range(self.pos, &mut self.block) {
                self.pos = self.end;
                self.block.clear();
                self.block_pos = 0;
                return Some(Err(e));
            }
            self.pos += n as u64;
            self.block_pos = 0;
        }
        let value = self.block[self.block_pos];
        self.block_pos += 1;
        Some(Ok(value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.pos) as usize + (self.block.len() - self.block_pos);
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdt_common::error::ErrorKind;

    #[test]
    fn test_set_get_and_errors() {
        let mut seq = BitPackedSequence::new(5, 10, SequenceStorage::Memory).unwrap();
        seq.set(3, 31).unwrap();
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.get(3).unwrap(), 31);
        assert_eq!(seq.get(9).unwrap(), 0);

        let err = seq.set(2, 32).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::ValueTooLarge {
                value: 32,
                bit_width: 5
            }
        ));
        assert_eq!(seq.get(2).unwrap(), 0);
        assert!(matches!(
            seq.get(10).unwrap_err().kind(),
            ErrorKind::OutOfRange { index: 10, len: 10 }
        ));
        assert!(seq.set(10, 1).is_err());
    }

    #[test]
    fn test_append_grows_by_doubling() {
        let mut seq = BitPackedSequence::new(7, 0, SequenceStorage::Memory).unwrap();
        for i in 0..100u64 {
            seq.append(i).unwrap();
        }
        assert_eq!(seq.len(), 100);
        assert_eq!(seq.capacity(), 128);
        assert_eq!(seq.to_vec().unwrap(), (0..100).collect::<Vec<_>>());
        seq.trim_to_size().unwrap();
        assert_eq!(seq.capacity(), 100);
        assert_eq!(seq.size_in_bytes(), words_for(7, 100) * 8);
    }

    #[test]
    fn test_zero_width_sequence() {
        let mut seq = BitPackedSequence::with_len(0, 5, SequenceStorage::Memory).unwrap();
        assert_eq!(seq.get(4).unwrap(), 0);
        assert!(seq.set(0, 1).is_err());
        seq.append(0).unwrap();
        assert_eq!(seq.len(), 6);
        assert_eq!(seq.size_in_bytes(), 0);
    }

    #[test]
    fn test_trim_bits_aggressive() {
        let mut seq = BitPackedSequence::new(32, 0, SequenceStorage::Memory).unwrap();
        for v in [3u64, 9, 1, 12, 0, 7] {
            seq.append(v).unwrap();
        }
        seq.trim_bits_aggressive().unwrap();
        assert_eq!(seq.bit_width(), 4);
        assert_eq!(seq.to_vec().unwrap(), vec![3, 9, 1, 12, 0, 7]);
        assert_eq!(seq.capacity(), 6);
    }

    #[test]
    fn test_repack_widen_then_narrow() {
        let values: Vec<u64> = (0..1000).map(|i| i % 61).collect();
        let mut seq = BitPackedSequence::from_values(&values, SequenceStorage::Memory).unwrap();
        assert_eq!(seq.bit_width(), 6);
        seq.repack(33).unwrap();
        assert_eq!(seq.to_vec().unwrap(), values);
        seq.append(1 << 32).unwrap();
        assert!(seq.repack(6).is_err());
        assert_eq!(seq.bit_width(), 33);
    }

    #[test]
    fn test_set_many_last_write_wins() {
        let mut seq = BitPackedSequence::with_len(9, 20, SequenceStorage::Memory).unwrap();
        let mut pairs = vec![(5, 1), (2, 2), (5, 3), (19, 4), (2, 5)];
        let mut scratch = Vec::new();
        seq.set_many(&mut pairs, &mut scratch).unwrap();
        assert_eq!(seq.get(5).unwrap(), 3);
        assert_eq!(seq.get(2).unwrap(), 5);
        assert_eq!(seq.get(19).unwrap(), 4);

        let mut bad = vec![(1, 7), (3, 512)];
        assert!(seq.set_many(&mut bad, &mut scratch).is_err());
        assert_eq!(seq.get(1).unwrap(), 0);
    }
}
