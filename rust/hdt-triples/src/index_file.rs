//! Persisted object and predicate indexes.
//!
//! Layout: an `Index` control block (`numTriples`, `order`), then the object
//! index bitmap and sequence, the predicate index bitmap and sequence (both
//! empty when the predicate index was not built), and the predicate counts.

use std::io::{BufRead, Write};

use hdt_bits::{BitmapBuilder, SuccinctBitmap};
use hdt_common::{
    Result,
    error::{Error, FormatViolation},
};
use hdt_format::{ControlBlock, ControlType, HDT_INDEX_FOQ};
use hdt_sequence::{BitPackedSequence, SequenceStorage};

use crate::{
    bitmap_triples::{
        BitmapTriples,
        persist::{PROPERTY_NUM_TRIPLES, PROPERTY_ORDER},
    },
    object_index::{IndexSet, ObjectIndex, PredicateIndex},
};

impl BitmapTriples {
    /// Writes the built indexes. Fails when they have not been built or
    /// loaded yet.
    pub fn save_index<W: Write>(&self, writer: &mut W) -> Result<()> {
        let indexes = self
            .indexes()
            .ok_or_else(|| Error::invalid_operation("save_index: object index not built"))?;
        ControlBlock::new(ControlType::Index, HDT_INDEX_FOQ)
            .with_property(PROPERTY_NUM_TRIPLES, self.len())
            .with_property(PROPERTY_ORDER, self.order().ordinal())
            .write(writer)?;
        indexes.object().bitmap().save(writer)?;
        indexes.object().sequence().save(writer)?;
        match indexes.predicate() {
            Some(predicate) => {
                predicate.bitmap().save(writer)?;
                predicate.sequence().save(writer)?;
            }
            None => {
                BitmapBuilder::new().finish().save(writer)?;
                BitPackedSequence::new(0, 0, SequenceStorage::Memory)?.save(writer)?;
            }
        }
        indexes.predicate_counts().save(writer)?;
        log::debug!(
            "saved index of {} triples ({} bytes in memory)",
            self.len(),
            indexes.size_in_bytes()
        );
        Ok(())
    }

    /// Reads indexes written by [`save_index`](Self::save_index) for this
    /// triple set and installs them. Indexes already in place are kept.
    pub fn load_index<R: BufRead>(&self, reader: &mut R) -> Result<&IndexSet> {
        let control = ControlBlock::read(reader)?;
        control.expect(ControlType::Index, HDT_INDEX_FOQ)?;
        let num_triples = control.u64_property(PROPERTY_NUM_TRIPLES)?;
        if num_triples != self.len() {
            return Err(mismatch(PROPERTY_NUM_TRIPLES, self.len(), num_triples));
        }
        let order = control.u64_property(PROPERTY_ORDER)?;
        if order != self.order().ordinal() as u64 {
            return Err(mismatch(PROPERTY_ORDER, self.order().ordinal() as u64, order));
        }

        let storage = self.options().object_index.index_storage.clone();
        let object_bitmap = SuccinctBitmap::load(reader)?;
        let object_sequence = BitPackedSequence::load(reader, storage.clone())?;
        if object_sequence.len() != self.len() || object_bitmap.len() != self.len() {
            return Err(Error::invalid_format_msg(
                "index file",
                format!(
                    "object index holds {} entries and {} bits for {} triples",
                    object_sequence.len(),
                    object_bitmap.len(),
                    self.len()
                ),
            ));
        }

        let predicate_bitmap = SuccinctBitmap::load(reader)?;
        let predicate_sequence = BitPackedSequence::load(reader, storage.clone())?;
        let predicate = if predicate_bitmap.is_empty() {
            None
        } else {
            if predicate_sequence.len() != self.number_of_y() {
                return Err(Error::invalid_format_msg(
                    "index file",
                    format!(
                        "predicate index holds {} entries for {} Y positions",
                        predicate_sequence.len(),
                        self.number_of_y()
                    ),
                ));
            }
            Some(PredicateIndex::new(predicate_bitmap, predicate_sequence))
        };
        let predicate_counts = BitPackedSequence::load(reader, storage)?;

        let indexes = IndexSet::new(
            ObjectIndex::new(object_bitmap, object_sequence),
            predicate,
            predicate_counts,
        );
        log::debug!("loaded index of {} triples", self.len());
        Ok(self.install_indexes(indexes))
    }
}

fn mismatch(field: &str, expected: u64, found: u64) -> Error {
    FormatViolation::ControlMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::TriplesOptions, order::TripleOrder, triple::TripleId};
    use std::io::Cursor;

    fn sample(order: TripleOrder) -> BitmapTriples {
        let triples = [(1, 1, 1), (1, 2, 2), (2, 1, 2)].map(TripleId::from);
        BitmapTriples::load(order, triples, TriplesOptions::default()).unwrap()
    }

    #[test]
    fn test_save_before_build_fails() {
        let bt = sample(TripleOrder::Spo);
        assert!(bt.save_index(&mut Vec::new()).is_err());
    }

    #[test]
    fn test_round_trip() {
        let bt = sample(TripleOrder::Spo);
        bt.generate_object_index().unwrap();
        let mut bytes = Vec::new();
        bt.save_index(&mut bytes).unwrap();

        let fresh = sample(TripleOrder::Spo);
        let loaded = fresh.load_index(&mut Cursor::new(bytes)).unwrap();
        let built = bt.indexes().unwrap();
        assert_eq!(
            loaded.object().sequence().to_vec().unwrap(),
            built.object().sequence().to_vec().unwrap()
        );
        assert_eq!(loaded.predicate_count(1).unwrap(), 2);
        assert_eq!(loaded.predicate().unwrap().list_range(2), Some(2..3));
    }

    #[test]
    fn test_mismatches_are_rejected() {
        let bt = sample(TripleOrder::Spo);
        bt.generate_object_index().unwrap();
        let mut bytes = Vec::new();
        bt.save_index(&mut bytes).unwrap();

        let other_order = sample(TripleOrder::Sop);
        let err = other_order.load_index(&mut Cursor::new(bytes.clone())).unwrap_err();
        assert_eq!(
            err.format_violation(),
            Some(&FormatViolation::ControlMismatch {
                field: "order".to_string(),
                expected: "2".to_string(),
                found: "1".to_string(),
            })
        );

        let smaller = BitmapTriples::load(
            TripleOrder::Spo,
            [TripleId::new(1, 1, 1)],
            TriplesOptions::default(),
        )
        .unwrap();
        let err = smaller.load_index(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(
            err.format_violation(),
            Some(FormatViolation::ControlMismatch { field, .. }) if field == "numTriples"
        ));
    }
}
