//! Inverted indexes over a [`BitmapTriples`].
//!
//! The object index lists, for every `z` value, the Y positions whose Z list
//! holds it, sorted by `(y, pos_y)`. The predicate index lists, for every `y`
//! value, the Y positions holding it in ascending order. Both are named after
//! their role in the SPO order; in other orders they index the `z` and `y`
//! components of the layout.

use std::{ops::Range, time::Instant};

use hdt_bits::SuccinctBitmap;
use hdt_common::Result;
use hdt_sequence::BitPackedSequence;

use crate::{
    adjacency::AdjacencyList,
    bitmap_triples::BitmapTriples,
    options::{ObjectIndexOptions, ObjectIndexStrategy},
};

mod disk_sort;
mod memory_efficient;
pub mod pair_sort;
mod predicate;

/// Y positions per object: one list per object `1..=number_of_objects`,
/// each closed by a one in `bitmap`.
pub struct ObjectIndex {
    bitmap: SuccinctBitmap,
    sequence: BitPackedSequence,
}

impl ObjectIndex {
    pub fn new(bitmap: SuccinctBitmap, sequence: BitPackedSequence) -> ObjectIndex {
        ObjectIndex { bitmap, sequence }
    }

    pub fn bitmap(&self) -> &SuccinctBitmap {
        &self.bitmap
    }

    pub fn sequence(&self) -> &BitPackedSequence {
        &self.sequence
    }

    pub fn adjacency(&self) -> AdjacencyList<'_> {
        AdjacencyList::new(&self.sequence, &self.bitmap)
    }

    pub fn number_of_objects(&self) -> u64 {
        self.bitmap.count_ones()
    }

    /// Index positions of `object`'s list, `None` for 0 or unknown objects.
    pub fn list_range(&self, object: u64) -> Option<Range<u64>> {
        if object == 0 {
            return None;
        }
        self.adjacency().list_range(object - 1)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.bitmap.size_in_bytes() + self.sequence.size_in_bytes()
    }
}

/// Y positions per predicate.
///
/// The bitmap is unary: for each predicate, as many zeros as it has
/// positions, then a one. Predicates that never occur get an empty list.
pub struct PredicateIndex {
    bitmap: SuccinctBitmap,
    sequence: BitPackedSequence,
}

impl PredicateIndex {
    pub fn new(bitmap: SuccinctBitmap, sequence: BitPackedSequence) -> PredicateIndex {
        PredicateIndex { bitmap, sequence }
    }

    pub fn bitmap(&self) -> &SuccinctBitmap {
        &self.bitmap
    }

    pub fn sequence(&self) -> &BitPackedSequence {
        &self.sequence
    }

    pub fn number_of_predicates(&self) -> u64 {
        self.bitmap.count_ones()
    }

    /// Index positions of `predicate`'s list, `None` for 0 or predicates past
    /// the largest one.
    pub fn list_range(&self, predicate: u64) -> Option<Range<u64>> {
        if predicate == 0 {
            return None;
        }
        let i = predicate - 1;
        let end = self.bitmap.select1(i)? - i;
        let start = if i == 0 {
            0
        } else {
            self.bitmap.select1(i - 1)? + 1 - i
        };
        Some(start..end)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.bitmap.size_in_bytes() + self.sequence.size_in_bytes()
    }
}

/// Everything [`BitmapTriples::generate_object_index`] produces.
pub struct IndexSet {
    object: ObjectIndex,
    predicate: Option<PredicateIndex>,
    predicate_counts: BitPackedSequence,
}

impl IndexSet {
    pub fn new(
        object: ObjectIndex,
        predicate: Option<PredicateIndex>,
        predicate_counts: BitPackedSequence,
    ) -> IndexSet {
        IndexSet {
            object,
            predicate,
            predicate_counts,
        }
    }

    pub fn object(&self) -> &ObjectIndex {
        &self.object
    }

    pub fn predicate(&self) -> Option<&PredicateIndex> {
        self.predicate.as_ref()
    }

    /// Occurrences of each predicate in the Y level, at `predicate - 1`.
    pub fn predicate_counts(&self) -> &BitPackedSequence {
        &self.predicate_counts
    }

    /// Y positions holding `predicate`; 0 for unknown predicates.
    pub fn predicate_count(&self, predicate: u64) -> Result<u64> {
        if predicate == 0 || predicate > self.predicate_counts.len() {
            return Ok(0);
        }
        self.predicate_counts.get(predicate - 1)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.object.size_in_bytes()
            + self.predicate.as_ref().map_or(0, |p| p.size_in_bytes())
            + self.predicate_counts.size_in_bytes()
    }
}

impl std::fmt::Debug for ObjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectIndex")
            .field("objects", &self.number_of_objects())
            .field("entries", &self.sequence.len())
            .field("bit_width", &self.sequence.bit_width())
            .finish()
    }
}

impl std::fmt::Debug for PredicateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateIndex")
            .field("predicates", &self.number_of_predicates())
            .field("entries", &self.sequence.len())
            .finish()
    }
}

impl std::fmt::Debug for IndexSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSet")
            .field("object", &self.object)
            .field("predicate", &self.predicate)
            .field("predicate_counts", &self.predicate_counts.len())
            .finish()
    }
}

pub(crate) fn build(bt: &BitmapTriples, options: &ObjectIndexOptions) -> Result<IndexSet> {
    options.validate()?;
    let started = Instant::now();
    let object = match options.strategy {
        ObjectIndexStrategy::MemoryEfficient => memory_efficient::build(bt, options)?,
        ObjectIndexStrategy::DiskSort => disk_sort::build(bt, options)?,
    };
    let predicate_counts = predicate::count(bt.seq_y(), options)?;
    let predicate = if options.build_predicate_index {
        Some(predicate::build(bt.seq_y(), &predicate_counts, options)?)
    } else {
        None
    };
    log::debug!(
        "object index ({:?}) over {} triples: {} objects, {} predicates, {} bytes in {:?}",
        options.strategy,
        bt.len(),
        object.number_of_objects(),
        predicate_counts.len(),
        object.size_in_bytes(),
        started.elapsed()
    );
    Ok(IndexSet::new(object, predicate, predicate_counts))
}
