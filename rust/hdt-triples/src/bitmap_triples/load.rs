use std::time::Instant;

use hdt_bits::{BitmapBuilder, bits::bits_needed};
use hdt_common::{Result, error::FormatViolation};
use hdt_sequence::BitPackedSequence;

use super::BitmapTriples;
use crate::{options::TriplesOptions, order::TripleOrder, triple::TripleId};

impl BitmapTriples {
    /// Builds the index from triples sorted in `order`.
    ///
    /// Fails with a format violation when a component is zero, `x` values are
    /// not contiguous from 1, or the stream is not sorted. Duplicate triples
    /// are kept.
    pub fn load<I>(order: TripleOrder, triples: I, options: TriplesOptions) -> Result<BitmapTriples>
    where
        I: IntoIterator<Item = TripleId>,
    {
        Self::try_load(order, triples.into_iter().map(Ok), options)
    }

    /// [`load`](Self::load) over a fallible stream; the first stream error is
    /// returned as is.
    pub fn try_load<I>(order: TripleOrder, triples: I, options: TriplesOptions) -> Result<BitmapTriples>
    where
        I: IntoIterator<Item = Result<TripleId>>,
    {
        options.validate()?;
        let started = Instant::now();
        let order = match order {
            TripleOrder::Unknown => TripleOrder::Spo,
            o => o,
        };
        let mut builder = LevelBuilder::new(&options)?;
        for triple in triples {
            builder.push(order.to_layout(&triple?))?;
        }
        let (seq_y, seq_z, bitmap_y, bitmap_z) = builder.finish()?;
        log::debug!(
            "loaded {} triples in {order} ({} x, {} y; widths {}/{}) in {:?}",
            seq_z.len(),
            bitmap_y.count_ones(),
            seq_y.len(),
            seq_y.bit_width(),
            seq_z.bit_width(),
            started.elapsed()
        );
        Ok(BitmapTriples::from_parts(
            order, seq_y, seq_z, bitmap_y, bitmap_z, options,
        ))
    }
}

/// Incremental construction of the two levels from `(x, y, z)` layouts.
struct LevelBuilder {
    seq_y: BitPackedSequence,
    seq_z: BitPackedSequence,
    bitmap_y: BitmapBuilder,
    bitmap_z: BitmapBuilder,
    last: Option<[u64; 3]>,
    count: u64,
}

impl LevelBuilder {
    fn new(options: &TriplesOptions) -> Result<LevelBuilder> {
        let width = options.initial_bit_width;
        let expected = options.expected_triples;
        Ok(LevelBuilder {
            seq_y: BitPackedSequence::new(width, expected, options.storage.clone())?,
            seq_z: BitPackedSequence::new(width, expected, options.storage.clone())?,
            bitmap_y: BitmapBuilder::with_capacity(expected),
            bitmap_z: BitmapBuilder::with_capacity(expected),
            last: None,
            count: 0,
        })
    }

    fn push(&mut self, xyz: [u64; 3]) -> Result<()> {
        let [x, y, z] = xyz;
        if x == 0 || y == 0 || z == 0 {
            return Err(FormatViolation::ZeroComponent {
                position: self.count,
            }
            .into());
        }
        match self.last {
            None => {
                if x != 1 {
                    return Err(FormatViolation::NonContiguousSubject {
                        previous: 0,
                        found: x,
                    }
                    .into());
                }
                append(&mut self.seq_y, y)?;
                append(&mut self.seq_z, z)?;
            }
            Some([px, py, pz]) => {
                if x != px {
                    if x != px + 1 {
                        return Err(FormatViolation::NonContiguousSubject {
                            previous: px,
                            found: x,
                        }
                        .into());
                    }
                    self.bitmap_y.push(true);
                    append(&mut self.seq_y, y)?;
                    self.bitmap_z.push(true);
                    append(&mut self.seq_z, z)?;
                } else if y != py {
                    if y < py {
                        return Err(FormatViolation::UnorderedMiddleLevel {
                            previous: py,
                            found: y,
                            position: self.count,
                        }
                        .into());
                    }
                    self.bitmap_y.push(false);
                    append(&mut self.seq_y, y)?;
                    self.bitmap_z.push(true);
                    append(&mut self.seq_z, z)?;
                } else {
                    if z < pz {
                        return Err(FormatViolation::UnorderedLowerLevel {
                            previous: pz,
                            found: z,
                            position: self.count,
                        }
                        .into());
                    }
                    self.bitmap_z.push(false);
                    append(&mut self.seq_z, z)?;
                }
            }
        }
        self.last = Some(xyz);
        self.count += 1;
        Ok(())
    }

    fn finish(
        mut self,
    ) -> Result<(BitPackedSequence, BitPackedSequence, hdt_bits::SuccinctBitmap, hdt_bits::SuccinctBitmap)> {
        if self.count > 0 {
            self.bitmap_y.push(true);
            self.bitmap_z.push(true);
        }
        self.seq_y.trim_bits_aggressive()?;
        self.seq_z.trim_to_size()?;
        Ok((
            self.seq_y,
            self.seq_z,
            self.bitmap_y.finish(),
            self.bitmap_z.finish(),
        ))
    }
}

/// Appends `value`, widening the sequence first when it does not fit.
fn append(seq: &mut BitPackedSequence, value: u64) -> Result<()> {
    let needed = bits_needed(value);
    if needed > seq.bit_width() {
        seq.repack(needed)?;
    }
    seq.append(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdt_common::error::Error;

    fn load(triples: &[(u64, u64, u64)]) -> Result<BitmapTriples> {
        BitmapTriples::load(
            TripleOrder::Spo,
            triples.iter().copied().map(TripleId::from),
            TriplesOptions::default(),
        )
    }

    fn bits(bitmap: &hdt_bits::SuccinctBitmap) -> Vec<bool> {
        (0..bitmap.len()).map(|i| bitmap.get(i)).collect()
    }

    #[test]
    fn test_levels_of_small_input() {
        let bt = load(&[(1, 1, 1), (1, 1, 2), (1, 2, 1), (2, 1, 1)]).unwrap();
        assert_eq!(bt.seq_y().to_vec().unwrap(), vec![1, 2, 1]);
        assert_eq!(bits(bt.bitmap_y()), vec![false, true, true]);
        assert_eq!(bt.seq_z().to_vec().unwrap(), vec![1, 2, 1, 1]);
        assert_eq!(bits(bt.bitmap_z()), vec![false, true, true, true]);
        assert_eq!(bt.seq_y().bit_width(), 2);
    }

    #[test]
    fn test_empty_input() {
        let bt = load(&[]).unwrap();
        assert!(bt.is_empty());
        assert_eq!(bt.number_of_x(), 0);
        assert_eq!(bt.bitmap_z().len(), 0);
        assert_eq!(bt.iter().count(), 0);
    }

    #[test]
    fn test_violations() {
        let violation = |r: Result<BitmapTriples>| r.unwrap_err().format_violation().cloned();
        assert_eq!(
            violation(load(&[(1, 1, 1), (3, 1, 1)])),
            Some(FormatViolation::NonContiguousSubject {
                previous: 1,
                found: 3
            })
        );
        assert_eq!(
            violation(load(&[(2, 1, 1)])),
            Some(FormatViolation::NonContiguousSubject {
                previous: 0,
                found: 2
            })
        );
        assert_eq!(
            violation(load(&[(1, 2, 1), (1, 1, 1)])),
            Some(FormatViolation::UnorderedMiddleLevel {
                previous: 2,
                found: 1,
                position: 1
            })
        );
        assert_eq!(
            violation(load(&[(1, 1, 5), (1, 1, 4)])),
            Some(FormatViolation::UnorderedLowerLevel {
                previous: 5,
                found: 4,
                position: 1
            })
        );
        assert_eq!(
            violation(load(&[(1, 1, 1), (1, 0, 2)])),
            Some(FormatViolation::ZeroComponent { position: 1 })
        );
    }

    #[test]
    fn test_duplicates_are_kept() {
        let bt = load(&[(1, 1, 1), (1, 1, 1), (1, 1, 2)]).unwrap();
        assert_eq!(bt.len(), 3);
        assert_eq!(bt.seq_z().to_vec().unwrap(), vec![1, 1, 2]);
    }

    #[test]
    fn test_ids_wider_than_initial_width() {
        let options = TriplesOptions {
            initial_bit_width: 2,
            ..Default::default()
        };
        let big = 1u64 << 40;
        let bt = BitmapTriples::load(
            TripleOrder::Spo,
            [TripleId::new(1, 3, 7), TripleId::new(1, big, big + 1)],
            options,
        )
        .unwrap();
        assert_eq!(bt.seq_z().to_vec().unwrap(), vec![7, big + 1]);
        assert_eq!(bt.seq_y().bit_width(), 41);
    }

    #[test]
    fn test_stream_error_is_returned() {
        let items = vec![
            Ok(TripleId::new(1, 1, 1)),
            Err(Error::invalid_arg("triples", "unreadable")),
        ];
        let err = BitmapTriples::try_load(TripleOrder::Spo, items, TriplesOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("unreadable"));
    }

    #[test]
    fn test_load_in_other_order() {
        // Sorted by (o, s, p).
        let triples = [(2, 5, 1), (1, 4, 2), (3, 4, 2)].map(TripleId::from);
        let bt = BitmapTriples::load(TripleOrder::Osp, triples, TriplesOptions::default()).unwrap();
        assert_eq!(bt.number_of_x(), 2);
        assert_eq!(bt.find_triple(2).unwrap(), TripleId::new(3, 4, 2));
    }
}
