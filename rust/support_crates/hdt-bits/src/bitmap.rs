//! Boundary bitmaps of the adjacency levels.
//!
//! Bits are appended through a [`BitmapBuilder`]; `finish` freezes them into a
//! [`SuccinctBitmap`] carrying a two-level rank directory (an absolute count per
//! 512-bit block and seven packed 9-bit relative counts per block) plus a
//! sample of the block holding every 512th one, which bounds the binary search
//! of `select1`.

use std::io::{Read, Write};

use hdt_common::Result;
use hdt_format::{BitmapHeader, PayloadReader, PayloadWriter};

use crate::bits::{le_bytes_to_words, low_mask, words_to_le_bytes};

const BLOCK_BITS: u64 = 512;
const BLOCK_WORDS: usize = 8;
const SELECT_SAMPLE: u64 = 512;

#[derive(Debug, Clone, Default)]
pub struct BitmapBuilder {
    words: Vec<u64>,
    len: u64,
}

impl BitmapBuilder {
    pub fn new() -> BitmapBuilder {
        BitmapBuilder::default()
    }

    pub fn with_capacity(bits: u64) -> BitmapBuilder {
        BitmapBuilder {
            words: Vec::with_capacity(bits.div_ceil(64) as usize),
            len: 0,
        }
    }

    /// A builder holding `len` zero bits.
    pub fn with_len(len: u64) -> BitmapBuilder {
        BitmapBuilder {
            words: vec![0; len.div_ceil(64) as usize],
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, bit: bool) {
        let pos = self.len;
        self.len += 1;
        if self.words.len() < self.len.div_ceil(64) as usize {
            self.words.push(0);
        }
        if bit {
            self.words[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }
    }

    /// Sets bit `i`, growing the bitmap with zeros when `i` is past the end.
    pub fn set(&mut self, i: u64, bit: bool) {
        if i >= self.len {
            self.len = i + 1;
            self.words.resize(self.len.div_ceil(64) as usize, 0);
        }
        let word = &mut self.words[(i / 64) as usize];
        if bit {
            *word |= 1u64 << (i % 64);
        } else {
            *word &= !(1u64 << (i % 64));
        }
    }

    pub fn get(&self, i: u64) -> bool {
        i < self.len && (self.words[(i / 64) as usize] >> (i % 64)) & 1 != 0
    }

    /// Freezes the bits and builds the rank/select directory.
    pub fn finish(self) -> SuccinctBitmap {
        SuccinctBitmap::from_words(self.words, self.len)
    }
}

/// Immutable bitmap with `rank1`/`select1` support. Safe to share between
/// threads without synchronization.
#[derive(Debug, Clone)]
pub struct SuccinctBitmap {
    /// Padded to a whole number of blocks.
    words: Vec<u64>,
    len: u64,
    /// Ones before each block; one extra trailing entry holds the total.
    block_ranks: Vec<u64>,
    /// Seven 9-bit cumulative counts per block (ones before words 1..=7).
    sub_ranks: Vec<u64>,
    /// Block containing the (j * 512)-th one.
    select_samples: Vec<u32>,
}

impl SuccinctBitmap {
    fn from_words(mut words: Vec<u64>, len: u64) -> SuccinctBitmap {
        let num_blocks = len.div_ceil(BLOCK_BITS) as usize;
        words.resize(num_blocks * BLOCK_WORDS, 0);
        if len % 64 != 0 {
            // Clear anything above `len` in the last word.
            let last = (len / 64) as usize;
            words[last] &= low_mask((len % 64) as u32);
        }

        let mut block_ranks = Vec::with_capacity(num_blocks + 1);
        let mut sub_ranks = Vec::with_capacity(num_blocks);
        let mut select_samples = Vec::new();
        let mut total = 0u64;
        let mut next_sample = 0u64;
        for block in 0..num_blocks {
            block_ranks.push(total);
            let mut relative = 0u64;
            let mut packed = 0u64;
            for j in 0..BLOCK_WORDS {
                if j > 0 {
                    packed |= relative << (9 * (j - 1));
                }
                relative += words[block * BLOCK_WORDS + j].count_ones() as u64;
            }
            sub_ranks.push(packed);
            total += relative;
            while next_sample < total {
                select_samples.push(block as u32);
                next_sample += SELECT_SAMPLE;
            }
        }
        block_ranks.push(total);

        SuccinctBitmap {
            words,
            len,
            block_ranks,
            sub_ranks,
            select_samples,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_ones(&self) -> u64 {
        self.block_ranks.last().copied().unwrap_or(0)
    }

    pub fn get(&self, i: u64) -> bool {
        i < self.len && (self.words[(i / 64) as usize] >> (i % 64)) & 1 != 0
    }

    /// Number of ones in `[0, i]`. Positions past the end count every one.
    pub fn rank1(&self, i: u64) -> u64 {
        self.rank_before(i.saturating_add(1))
    }

    /// Number of ones in `[0, pos)`.
    fn rank_before(&self, pos: u64) -> u64 {
        if pos >= self.len {
            return self.count_ones();
        }
        let block = (pos / BLOCK_BITS) as usize;
        let word_in_block = ((pos % BLOCK_BITS) / 64) as usize;
        let mut rank = self.block_ranks[block] + self.relative_rank(block, word_in_block);
        let word = self.words[block * BLOCK_WORDS + word_in_block];
        rank += (word & low_mask((pos % 64) as u32)).count_ones() as u64;
        rank
    }

    #[inline]
    fn relative_rank(&self, block: usize, word_in_block: usize) -> u64 {
        if word_in_block == 0 {
            0
        } else {
            (self.sub_ranks[block] >> (9 * (word_in_block - 1))) & 0x1ff
        }
    }

    /// Position of the (n+1)-th one, or `None` if there are at most `n` ones.
    pub fn select1(&self, n: u64) -> Option<u64> {
        if n >= self.count_ones() {
            return None;
        }
        let sample = (n / SELECT_SAMPLE) as usize;
        let mut lo = self.select_samples[sample] as usize;
        let mut hi = self
            .select_samples
            .get(sample + 1)
            .map_or(self.block_ranks.len() - 1, |&b| b as usize + 1);
        // Last block whose starting rank is <= n.
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.block_ranks[mid] <= n {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let block = lo;
        let mut remaining = n - self.block_ranks[block];
        let mut word_in_block = 0;
        for j in 1..BLOCK_WORDS {
            if self.relative_rank(block, j) <= remaining {
                word_in_block = j;
            } else {
                break;
            }
        }
        remaining -= self.relative_rank(block, word_in_block);
        let word = self.words[block * BLOCK_WORDS + word_in_block];
        let bit = select_in_word(word, remaining as u32);
        Some(block as u64 * BLOCK_BITS + word_in_block as u64 * 64 + bit as u64)
    }

    /// Position of the first one at or after `from`.
    pub fn select_next1(&self, from: u64) -> Option<u64> {
        self.select1(self.rank_before(from))
    }

    pub fn size_in_bytes(&self) -> usize {
        (self.words.len() + self.block_ranks.len() + self.sub_ranks.len()) * 8
            + self.select_samples.len() * 4
    }

    /// Writes the plain bitmap container.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header = BitmapHeader { len: self.len };
        header.write(writer)?;
        let mut bytes = Vec::new();
        words_to_le_bytes(&self.words, header.payload_len() as usize, &mut bytes);
        let mut payload = PayloadWriter::new(writer);
        payload.write_all(&bytes)?;
        payload.finish()?;
        Ok(())
    }

    pub fn load<R: Read>(reader: &mut R) -> Result<SuccinctBitmap> {
        let header = BitmapHeader::read(reader)?;
        let mut bytes = vec![0u8; header.payload_len() as usize];
        let mut payload = PayloadReader::new(reader, header.payload_len(), "bitmap");
        payload.read_exact(&mut bytes)?;
        payload.finish()?;
        let mut words = vec![0u64; header.len.div_ceil(64) as usize];
        le_bytes_to_words(&bytes, &mut words);
        Ok(SuccinctBitmap::from_words(words, header.len))
    }
}

/// Position of the (r+1)-th set bit of `word`; the caller guarantees it exists.
#[inline]
fn select_in_word(mut word: u64, r: u32) -> u32 {
    for _ in 0..r {
        word &= word - 1;
    }
    word.trailing_zeros()
}
