//! The BitmapTriples section: a control block followed by `bitmap_y`,
//! `bitmap_z`, `seq_y` and `seq_z` containers.

use std::io::{BufRead, Write};

use hdt_bits::SuccinctBitmap;
use hdt_common::{
    Result,
    error::{Error, FormatViolation},
};
use hdt_format::{ControlBlock, ControlType, HDT_TRIPLES_BITMAP};
use hdt_sequence::BitPackedSequence;

use super::BitmapTriples;
use crate::{options::TriplesOptions, order::TripleOrder};

pub const PROPERTY_ORDER: &str = "order";
pub const PROPERTY_NUM_TRIPLES: &str = "numTriples";

impl BitmapTriples {
    /// Writes this index as a triples section.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        ControlBlock::new(ControlType::Triples, HDT_TRIPLES_BITMAP)
            .with_property(PROPERTY_ORDER, self.order.ordinal())
            .with_property(PROPERTY_NUM_TRIPLES, self.len())
            .write(writer)?;
        self.bitmap_y.save(writer)?;
        self.bitmap_z.save(writer)?;
        self.seq_y.save(writer)?;
        self.seq_z.save(writer)?;
        log::debug!("saved {} triples in {}", self.len(), self.order);
        Ok(())
    }

    /// Reads a triples section written by [`save`](Self::save).
    ///
    /// Sizes are always cross-checked; level ordering only when
    /// `options.validate_levels` is set.
    pub fn read<R: BufRead>(reader: &mut R, options: TriplesOptions) -> Result<BitmapTriples> {
        options.validate()?;
        let control = ControlBlock::read(reader)?;
        control.expect(ControlType::Triples, HDT_TRIPLES_BITMAP)?;
        let ordinal = control.u64_property(PROPERTY_ORDER)?;
        let order = u8::try_from(ordinal)
            .ok()
            .and_then(TripleOrder::from_ordinal)
            .ok_or_else(|| {
                Error::invalid_format_msg("triples section", format!("unknown order {ordinal}"))
            })?;
        let order = match order {
            TripleOrder::Unknown => TripleOrder::Spo,
            o => o,
        };
        let num_triples = control.u64_property(PROPERTY_NUM_TRIPLES)?;

        let bitmap_y = SuccinctBitmap::load(reader)?;
        let bitmap_z = SuccinctBitmap::load(reader)?;
        let seq_y = BitPackedSequence::load(reader, options.storage.clone())?;
        let seq_z = BitPackedSequence::load(reader, options.storage.clone())?;
        check_shape(num_triples, &bitmap_y, &bitmap_z, &seq_y, &seq_z)?;

        let bt = BitmapTriples::from_parts(order, seq_y, seq_z, bitmap_y, bitmap_z, options);
        if bt.options.validate_levels {
            bt.validate_levels()?;
        }
        log::debug!("read {} triples in {order}", bt.len());
        Ok(bt)
    }

    /// Walks both levels and checks the ordering `load` enforces: non-zero
    /// components, strictly increasing `y` within each `x`, non-decreasing
    /// `z` within each `(x, y)`.
    pub fn validate_levels(&self) -> Result<()> {
        let mut previous_y = 0u64;
        for pos_y in 0..self.seq_y.len() {
            let y = self.seq_y.get(pos_y)?;
            if y == 0 {
                return Err(FormatViolation::ZeroComponent { position: pos_y }.into());
            }
            let list_start = pos_y == 0 || self.bitmap_y.get(pos_y - 1);
            if !list_start && y <= previous_y {
                return Err(FormatViolation::UnorderedMiddleLevel {
                    previous: previous_y,
                    found: y,
                    position: pos_y,
                }
                .into());
            }
            previous_y = y;
        }
        let mut previous_z = 0u64;
        for (pos_z, z) in self.seq_z.iter().enumerate() {
            let z = z?;
            let pos_z = pos_z as u64;
            if z == 0 {
                return Err(FormatViolation::ZeroComponent { position: pos_z }.into());
            }
            let list_start = pos_z == 0 || self.bitmap_z.get(pos_z - 1);
            if !list_start && z < previous_z {
                return Err(FormatViolation::UnorderedLowerLevel {
                    previous: previous_z,
                    found: z,
                    position: pos_z,
                }
                .into());
            }
            previous_z = z;
        }
        Ok(())
    }
}

fn check_shape(
    num_triples: u64,
    bitmap_y: &SuccinctBitmap,
    bitmap_z: &SuccinctBitmap,
    seq_y: &BitPackedSequence,
    seq_z: &BitPackedSequence,
) -> Result<()> {
    let mismatch = |what: &str, expected: u64, found: u64| {
        Error::invalid_format_msg(
            "triples section",
            format!("{what}: expected {expected}, found {found}"),
        )
    };
    if seq_z.len() != num_triples {
        return Err(mismatch("seq_z length", num_triples, seq_z.len()));
    }
    if bitmap_z.len() != seq_z.len() {
        return Err(mismatch("bitmap_z length", seq_z.len(), bitmap_z.len()));
    }
    if bitmap_y.len() != seq_y.len() {
        return Err(mismatch("bitmap_y length", seq_y.len(), bitmap_y.len()));
    }
    if bitmap_z.count_ones() != seq_y.len() {
        return Err(mismatch("Z lists", seq_y.len(), bitmap_z.count_ones()));
    }
    if seq_z.is_empty() != seq_y.is_empty() {
        return Err(mismatch("Y entries", u64::from(!seq_z.is_empty()), seq_y.len()));
    }
    if !seq_z.is_empty()
        && !(bitmap_y.get(bitmap_y.len() - 1) && bitmap_z.get(bitmap_z.len() - 1))
    {
        return Err(Error::invalid_format_msg(
            "triples section",
            "last list is not terminated",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triple::TripleId;
    use std::io::Cursor;

    fn sample() -> BitmapTriples {
        // Sorted by (p, o, s).
        let triples = [(1, 1, 1), (2, 1, 1), (1, 1, 2), (1, 2, 1)].map(TripleId::from);
        BitmapTriples::load(TripleOrder::Pos, triples, TriplesOptions::default()).unwrap()
    }

    #[test]
    fn test_section_round_trip() {
        let bt = sample();
        let mut bytes = Vec::new();
        bt.save(&mut bytes).unwrap();
        let options = TriplesOptions {
            validate_levels: true,
            ..Default::default()
        };
        let read = BitmapTriples::read(&mut Cursor::new(bytes), options).unwrap();
        assert_eq!(read.order(), bt.order());
        assert_eq!(read.len(), bt.len());
        let a: Vec<_> = bt.iter().map(|t| t.unwrap()).collect();
        let b: Vec<_> = read.iter().map(|t| t.unwrap()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_count_is_rejected() {
        let bt = sample();
        let mut bytes = Vec::new();
        ControlBlock::new(ControlType::Triples, HDT_TRIPLES_BITMAP)
            .with_property(PROPERTY_ORDER, 1)
            .with_property(PROPERTY_NUM_TRIPLES, 5)
            .write(&mut bytes)
            .unwrap();
        bt.bitmap_y().save(&mut bytes).unwrap();
        bt.bitmap_z().save(&mut bytes).unwrap();
        bt.seq_y().save(&mut bytes).unwrap();
        bt.seq_z().save(&mut bytes).unwrap();
        let err = BitmapTriples::read(&mut Cursor::new(bytes), TriplesOptions::default()).unwrap_err();
        assert!(err.is_format_violation(), "{err}");
    }

    #[test]
    fn test_wrong_section_type_is_rejected() {
        let mut bytes = Vec::new();
        ControlBlock::new(ControlType::Index, HDT_TRIPLES_BITMAP)
            .write(&mut bytes)
            .unwrap();
        let err = BitmapTriples::read(&mut Cursor::new(bytes), TriplesOptions::default()).unwrap_err();
        assert!(matches!(
            err.format_violation(),
            Some(FormatViolation::ControlMismatch { .. })
        ));
    }

    #[test]
    fn test_unordered_levels_are_detected() {
        let y = BitPackedSequence::from_values(&[2, 1], Default::default()).unwrap();
        let z = BitPackedSequence::from_values(&[1, 1], Default::default()).unwrap();
        let mut bitmap_y = hdt_bits::BitmapBuilder::new();
        bitmap_y.push(false);
        bitmap_y.push(true);
        let mut bitmap_z = hdt_bits::BitmapBuilder::new();
        bitmap_z.push(true);
        bitmap_z.push(true);
        let bt = BitmapTriples::from_parts(
            TripleOrder::Spo,
            y,
            z,
            bitmap_y.finish(),
            bitmap_z.finish(),
            TriplesOptions::default(),
        );
        assert_eq!(
            bt.validate_levels().unwrap_err().format_violation(),
            Some(&FormatViolation::UnorderedMiddleLevel {
                previous: 2,
                found: 1,
                position: 1
            })
        );
    }
}
