use std::time::Instant;

use hdt_bits::{BitmapBuilder, bits::bits_needed};
use hdt_common::{
    Result,
    error::{Error, FormatViolation},
};
use hdt_sequence::BitPackedSequence;

use super::PredicateIndex;
use crate::options::ObjectIndexOptions;

/// Counts the occurrences of every `y` value; the count of `p` lands at
/// `p - 1`.
pub(super) fn count(seq_y: &BitPackedSequence, options: &ObjectIndexOptions) -> Result<BitPackedSequence> {
    let started = Instant::now();
    let mut counts = BitPackedSequence::new(
        bits_needed(seq_y.len()),
        0,
        options.index_storage.clone(),
    )?;
    for (pos_y, p) in seq_y.iter().enumerate() {
        let p = p?;
        if p == 0 {
            return Err(FormatViolation::ZeroComponent {
                position: pos_y as u64,
            }
            .into());
        }
        // More predicate slots than Y positions means a mostly empty
        // counter; refuse it before allocating.
        if p > seq_y.len() {
            return Err(Error::resource_exhausted("predicate counts", p, seq_y.len()));
        }
        counts.grow_to(p)?;
        let c = counts.get(p - 1)?;
        counts.set(p - 1, c + 1)?;
    }
    counts.trim_to_size()?;
    log::debug!(
        "predicate counts: {} predicates over {} Y positions in {:?}",
        counts.len(),
        seq_y.len(),
        started.elapsed()
    );
    Ok(counts)
}

/// Lists the Y positions of every predicate, ascending.
pub(super) fn build(
    seq_y: &BitPackedSequence,
    counts: &BitPackedSequence,
    options: &ObjectIndexOptions,
) -> Result<PredicateIndex> {
    let started = Instant::now();
    let len_y = seq_y.len();
    let storage = options.index_storage.clone();

    let mut bitmap = BitmapBuilder::with_capacity(len_y + counts.len());
    let mut bases = BitPackedSequence::with_len(bits_needed(len_y), counts.len(), storage.clone())?;
    let mut next = 0u64;
    for (i, c) in counts.iter().enumerate() {
        let c = c?;
        bases.set(i as u64, next)?;
        for _ in 0..c {
            bitmap.push(false);
        }
        bitmap.push(true);
        next += c;
    }

    let mut sequence =
        BitPackedSequence::with_len(bits_needed(len_y.saturating_sub(1)), len_y, storage)?;
    let mut pairs = Vec::with_capacity(options.batch_size.min(len_y as usize));
    let mut scratch = Vec::new();
    for (pos_y, p) in seq_y.iter().enumerate() {
        let p = p?;
        let slot = bases.get(p - 1)?;
        bases.set(p - 1, slot + 1)?;
        pairs.push((slot, pos_y as u64));
        if pairs.len() >= options.batch_size {
            sequence.set_many(&mut pairs, &mut scratch)?;
            pairs.clear();
        }
    }
    sequence.set_many(&mut pairs, &mut scratch)?;

    log::debug!(
        "predicate index: {len_y} positions in {:?}",
        started.elapsed()
    );
    Ok(PredicateIndex::new(bitmap.finish(), sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bitmap_triples::BitmapTriples, options::TriplesOptions, order::TripleOrder,
        triple::TripleId,
    };
    use hdt_common::error::ErrorKind;

    fn load(triples: &[(u64, u64, u64)]) -> BitmapTriples {
        BitmapTriples::load(
            TripleOrder::Spo,
            triples.iter().copied().map(TripleId::from),
            TriplesOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_counts_and_lists() {
        let bt = load(&[(1, 1, 1), (1, 3, 1), (2, 3, 2), (3, 1, 1)]);
        let options = ObjectIndexOptions::default();
        let counts = count(bt.seq_y(), &options).unwrap();
        assert_eq!(counts.to_vec().unwrap(), vec![2, 0, 2]);
        let index = build(bt.seq_y(), &counts, &options).unwrap();
        assert_eq!(index.list_range(1), Some(0..2));
        assert_eq!(index.list_range(2), Some(2..2));
        assert_eq!(index.list_range(3), Some(2..4));
        assert_eq!(index.sequence().to_vec().unwrap(), vec![0, 3, 1, 2]);
    }

    #[test]
    fn test_sparse_predicate_id_is_refused() {
        let bt = load(&[(1, 1, 1), (1, 1 << 33, 1)]);
        let err = count(bt.seq_y(), &ObjectIndexOptions::default()).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::ResourceExhausted { requested, limit: 2, .. } if *requested == 1 << 33
        ));
    }
}
