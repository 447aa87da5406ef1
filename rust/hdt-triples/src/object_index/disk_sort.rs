//! Object index built by externally sorting `(object, predicate, pos_y)`
//! records and emitting the lists in one pass over the merged stream.

use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use hdt_bits::{BitmapBuilder, bits::bits_needed};
use hdt_common::{Result, error::FormatViolation};
use hdt_sequence::BitPackedSequence;

use super::ObjectIndex;
use crate::{bitmap_triples::BitmapTriples, merge::ExternalSorter, options::ObjectIndexOptions};

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct ObjectRecord {
    object: u64,
    predicate: u64,
    pos_y: u64,
}

pub(super) fn build(bt: &BitmapTriples, options: &ObjectIndexOptions) -> Result<ObjectIndex> {
    let len_z = bt.len();
    let storage = options.index_storage.clone();
    if len_z == 0 {
        return Ok(ObjectIndex::new(
            BitmapBuilder::new().finish(),
            BitPackedSequence::new(0, 0, storage)?,
        ));
    }

    let started = Instant::now();
    // Stable on (object, predicate): records of equal keys stay in pos_y order.
    let mut sorter = ExternalSorter::new(
        options.resolve_temp_store()?,
        options.run_length,
        |a: &ObjectRecord, b: &ObjectRecord| (a.object, a.predicate).cmp(&(b.object, b.predicate)),
    );
    let bitmap_z = bt.bitmap_z();
    let mut pos_y = 0u64;
    let mut predicate = bt.seq_y().get(0)?;
    for (pos_z, object) in bt.seq_z().iter().enumerate() {
        let object = object?;
        if object == 0 {
            return Err(FormatViolation::ZeroComponent {
                position: pos_z as u64,
            }
            .into());
        }
        sorter.push(ObjectRecord {
            object,
            predicate,
            pos_y,
        })?;
        if bitmap_z.get(pos_z as u64) {
            pos_y += 1;
            if pos_y < bt.number_of_y() {
                predicate = bt.seq_y().get(pos_y)?;
            }
        }
    }
    log::debug!(
        "object index: {len_z} records in {} runs in {:?}",
        sorter.spilled_runs(),
        started.elapsed()
    );

    let started = Instant::now();
    let width = bits_needed(bt.number_of_y() - 1);
    let mut sequence = BitPackedSequence::with_len(width, len_z, storage)?;
    let mut bitmap = BitmapBuilder::with_len(len_z);
    let mut values = Vec::with_capacity(options.batch_size.min(len_z as usize));
    let mut flushed = 0u64;
    let mut slot = 0u64;
    let mut previous = 0u64;
    for record in sorter.finish()? {
        let record = record?;
        if record.object != previous {
            if record.object != previous + 1 {
                return Err(FormatViolation::NonContiguousObject {
                    previous,
                    found: record.object,
                }
                .into());
            }
            if slot > 0 {
                bitmap.set(slot - 1, true);
            }
            previous = record.object;
        }
        values.push(record.pos_y);
        slot += 1;
        if values.len() >= options.batch_size {
            sequence.set_range(flushed, &values)?;
            flushed += values.len() as u64;
            values.clear();
        }
    }
    sequence.set_range(flushed, &values)?;
    bitmap.set(slot - 1, true);
    log::debug!(
        "object index: merged {slot} records into {previous} lists in {:?}",
        started.elapsed()
    );
    Ok(ObjectIndex::new(bitmap.finish(), sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::TriplesOptions, order::TripleOrder, triple::TripleId};

    fn options() -> ObjectIndexOptions {
        ObjectIndexOptions {
            temp_store: Some(hdt_io_impl::temp_file_store::create_in_memory(1 << 24).unwrap()),
            run_length: 3,
            batch_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_matches_memory_efficient() {
        let triples = [(1, 3, 1), (1, 5, 2), (2, 1, 1), (2, 3, 2), (2, 3, 3), (3, 2, 1)]
            .map(TripleId::from);
        let bt = BitmapTriples::load(TripleOrder::Spo, triples, TriplesOptions::default()).unwrap();
        let disk = build(&bt, &options()).unwrap();
        let memory = super::super::memory_efficient::build(&bt, &ObjectIndexOptions::default()).unwrap();
        assert_eq!(
            disk.sequence().to_vec().unwrap(),
            memory.sequence().to_vec().unwrap()
        );
        assert_eq!(disk.number_of_objects(), 3);
        for object in 1..=3 {
            assert_eq!(disk.list_range(object), memory.list_range(object));
        }
    }

    #[test]
    fn test_missing_object_is_rejected() {
        let triples = [(1, 1, 2), (1, 2, 3)].map(TripleId::from);
        let bt = BitmapTriples::load(TripleOrder::Spo, triples, TriplesOptions::default()).unwrap();
        let err = build(&bt, &options()).unwrap_err();
        assert_eq!(
            err.format_violation(),
            Some(&FormatViolation::NonContiguousObject {
                previous: 0,
                found: 2
            })
        );
    }
}
