use std::ops::Range;

use hdt_bits::SuccinctBitmap;
use hdt_common::Result;
use hdt_sequence::BitPackedSequence;

/// A sequence split into consecutive lists, with a one in the bitmap on the
/// last element of every list.
///
/// Borrowing view; it owns neither part.
#[derive(Clone, Copy)]
pub struct AdjacencyList<'a> {
    sequence: &'a BitPackedSequence,
    bitmap: &'a SuccinctBitmap,
}

impl<'a> AdjacencyList<'a> {
    pub fn new(sequence: &'a BitPackedSequence, bitmap: &'a SuccinctBitmap) -> Self {
        AdjacencyList { sequence, bitmap }
    }

    pub fn len(&self) -> u64 {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn get(&self, pos: u64) -> Result<u64> {
        self.sequence.get(pos)
    }

    pub fn number_of_lists(&self) -> u64 {
        self.bitmap.count_ones()
    }

    /// Zero-based index of the list containing `pos`.
    pub fn find_list_index(&self, pos: u64) -> u64 {
        if pos == 0 {
            0
        } else {
            self.bitmap.rank1(pos - 1)
        }
    }

    /// Positions of the zero-based list `i`, or `None` past the last list.
    pub fn list_range(&self, i: u64) -> Option<Range<u64>> {
        let end = self.bitmap.select1(i)? + 1;
        let start = if i == 0 {
            0
        } else {
            self.bitmap.select1(i - 1)? + 1
        };
        Some(start..end)
    }

    /// First position in `range` whose value is not less than `value`; the
    /// list is sorted ascending.
    pub fn lower_bound(&self, range: Range<u64>, value: u64) -> Result<u64> {
        let (mut lo, mut hi) = (range.start, range.end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.sequence.get(mid)? < value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// First position in `range` whose value is greater than `value`.
    pub fn upper_bound(&self, range: Range<u64>, value: u64) -> Result<u64> {
        let (mut lo, mut hi) = (range.start, range.end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.sequence.get(mid)? <= value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// First position in `range` holding `value`.
    pub fn binary_search(&self, range: Range<u64>, value: u64) -> Result<Option<u64>> {
        let end = range.end;
        let pos = self.lower_bound(range, value)?;
        if pos < end && self.sequence.get(pos)? == value {
            Ok(Some(pos))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdt_bits::BitmapBuilder;
    use hdt_sequence::SequenceStorage;

    fn build(values: &[u64], ends: &[bool]) -> (BitPackedSequence, SuccinctBitmap) {
        let seq = BitPackedSequence::from_values(values, SequenceStorage::Memory).unwrap();
        let mut bitmap = BitmapBuilder::new();
        for &bit in ends {
            bitmap.push(bit);
        }
        (seq, bitmap.finish())
    }

    #[test]
    fn test_lists() {
        // Lists: [1 3 3 7] [2] [4 5]
        let (seq, bitmap) = build(
            &[1, 3, 3, 7, 2, 4, 5],
            &[false, false, false, true, true, false, true],
        );
        let adj = AdjacencyList::new(&seq, &bitmap);
        assert_eq!(adj.number_of_lists(), 3);
        assert_eq!(adj.list_range(0), Some(0..4));
        assert_eq!(adj.list_range(1), Some(4..5));
        assert_eq!(adj.list_range(2), Some(5..7));
        assert_eq!(adj.list_range(3), None);
        assert_eq!(adj.find_list_index(0), 0);
        assert_eq!(adj.find_list_index(3), 0);
        assert_eq!(adj.find_list_index(4), 1);
        assert_eq!(adj.find_list_index(6), 2);

        assert_eq!(adj.binary_search(0..4, 3).unwrap(), Some(1));
        assert_eq!(adj.binary_search(0..4, 4).unwrap(), None);
        assert_eq!(adj.binary_search(5..7, 5).unwrap(), Some(6));
        assert_eq!(adj.upper_bound(0..4, 3).unwrap(), 3);
        assert_eq!(adj.lower_bound(0..4, 8).unwrap(), 4);
    }
}
