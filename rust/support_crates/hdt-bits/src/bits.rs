/// Number of bits required to represent `max` (0 for 0).
#[inline]
pub fn bits_needed(max: u64) -> u32 {
    64 - max.leading_zeros()
}

/// Mask of the `width` lowest bits.
#[inline]
pub fn low_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Number of 64-bit words needed to hold `count` fields of `width` bits.
#[inline]
pub fn words_for(width: u32, count: u64) -> usize {
    (width as u64 * count).div_ceil(64) as usize
}

/// Reads the `width`-bit field at bit offset `bit_pos`, spanning at most two words.
///
/// The caller guarantees the field lies within `words`.
#[inline]
pub fn get_bits(words: &[u64], bit_pos: u64, width: u32) -> u64 {
    if width == 0 {
        return 0;
    }
    let word = (bit_pos / 64) as usize;
    let shift = (bit_pos % 64) as u32;
    let mut value = words[word] >> shift;
    if shift + width > 64 {
        value |= words[word + 1] << (64 - shift);
    }
    value & low_mask(width)
}

/// Writes `value` (already masked to `width` bits) into the field at `bit_pos`.
#[inline]
pub fn set_bits(words: &mut [u64], bit_pos: u64, width: u32, value: u64) {
    if width == 0 {
        return;
    }
    let mask = low_mask(width);
    let word = (bit_pos / 64) as usize;
    let shift = (bit_pos % 64) as u32;
    words[word] = (words[word] & !(mask << shift)) | (value << shift);
    if shift + width > 64 {
        let high = shift + width - 64;
        let spill = 64 - shift;
        words[word + 1] = (words[word + 1] & !low_mask(high)) | (value >> spill);
    }
}

/// Serializes the first `byte_len` bytes of `words` in little-endian order.
pub fn words_to_le_bytes(words: &[u64], byte_len: usize, out: &mut Vec<u8>) {
    out.reserve(byte_len);
    let mut remaining = byte_len;
    for word in words {
        if remaining == 0 {
            break;
        }
        let bytes = word.to_le_bytes();
        let n = remaining.min(8);
        out.extend_from_slice(&bytes[..n]);
        remaining -= n;
    }
}

/// Inverse of [`words_to_le_bytes`]: fills `words` from a little-endian byte stream
/// whose last word may be partial.
pub fn le_bytes_to_words(bytes: &[u8], words: &mut [u64]) {
    for (word, chunk) in words.iter_mut().zip(bytes.chunks(8)) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        *word = u64::from_le_bytes(buf);
    }
}
