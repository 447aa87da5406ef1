use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use hdt_bits::SuccinctBitmap;
use hdt_common::Result;
use hdt_sequence::BitPackedSequence;

use crate::{
    adjacency::AdjacencyList, object_index::IndexSet, options::TriplesOptions,
    order::TripleOrder, triple::TripleId,
};

mod load;
pub mod persist;
pub mod search;
mod secondary;

/// A sorted triple set in one component order, stored as two levels of
/// adjacency lists.
///
/// With `(x, y, z)` the components in `order`, `seq_y` holds the `y` values
/// grouped per `x` (a one in `bitmap_y` closes each group) and `seq_z` holds
/// the `z` values grouped per `(x, y)` (closed by `bitmap_z`). `x` itself is
/// implicit: the group number plus one.
///
/// Frozen after construction. Derived indexes are built on demand, once, and
/// read without locks.
pub struct BitmapTriples {
    order: TripleOrder,
    seq_y: BitPackedSequence,
    seq_z: BitPackedSequence,
    bitmap_y: SuccinctBitmap,
    bitmap_z: SuccinctBitmap,
    options: TriplesOptions,
    indexes: OnceLock<IndexSet>,
    secondaries: [OnceLock<Arc<BitmapTriples>>; 6],
    build_lock: Mutex<()>,
}

impl BitmapTriples {
    fn from_parts(
        order: TripleOrder,
        seq_y: BitPackedSequence,
        seq_z: BitPackedSequence,
        bitmap_y: SuccinctBitmap,
        bitmap_z: SuccinctBitmap,
        options: TriplesOptions,
    ) -> BitmapTriples {
        BitmapTriples {
            order,
            seq_y,
            seq_z,
            bitmap_y,
            bitmap_z,
            options,
            indexes: OnceLock::new(),
            secondaries: Default::default(),
            build_lock: Mutex::new(()),
        }
    }

    pub fn order(&self) -> TripleOrder {
        self.order
    }

    pub fn options(&self) -> &TriplesOptions {
        &self.options
    }

    /// Number of triples, duplicates included.
    pub fn len(&self) -> u64 {
        self.seq_z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq_z.is_empty()
    }

    /// Number of distinct `x` values, which are `1..=number_of_x`.
    pub fn number_of_x(&self) -> u64 {
        self.bitmap_y.count_ones()
    }

    /// Number of distinct `(x, y)` pairs.
    pub fn number_of_y(&self) -> u64 {
        self.seq_y.len()
    }

    pub fn seq_y(&self) -> &BitPackedSequence {
        &self.seq_y
    }

    pub fn seq_z(&self) -> &BitPackedSequence {
        &self.seq_z
    }

    pub fn bitmap_y(&self) -> &SuccinctBitmap {
        &self.bitmap_y
    }

    pub fn bitmap_z(&self) -> &SuccinctBitmap {
        &self.bitmap_z
    }

    pub fn adjacency_y(&self) -> AdjacencyList<'_> {
        AdjacencyList::new(&self.seq_y, &self.bitmap_y)
    }

    pub fn adjacency_z(&self) -> AdjacencyList<'_> {
        AdjacencyList::new(&self.seq_z, &self.bitmap_z)
    }

    /// The object and predicate indexes, if built or loaded.
    pub fn indexes(&self) -> Option<&IndexSet> {
        self.indexes.get()
    }

    /// A cached index of the same triples in `order`.
    pub fn secondary(&self, order: TripleOrder) -> Option<&Arc<BitmapTriples>> {
        match order {
            TripleOrder::Unknown => None,
            o => self.secondaries[o.ordinal() as usize - 1].get(),
        }
    }

    /// Bytes held by the sequences, bitmaps and any derived index.
    pub fn size_in_bytes(&self) -> usize {
        let own = self.seq_y.size_in_bytes()
            + self.seq_z.size_in_bytes()
            + self.bitmap_y.size_in_bytes()
            + self.bitmap_z.size_in_bytes();
        own + self.indexes.get().map_or(0, |i| i.size_in_bytes())
    }

    /// Reconstructs the triple stored at Z position `pos_z`.
    pub fn find_triple(&self, pos_z: u64) -> Result<TripleId> {
        let z = self.seq_z.get(pos_z)?;
        let pos_y = self.adjacency_z().find_list_index(pos_z);
        let y = self.seq_y.get(pos_y)?;
        let x = self.adjacency_y().find_list_index(pos_y) + 1;
        Ok(self.order.from_layout([x, y, z]))
    }

    /// Every triple in native order.
    pub fn iter(&self) -> search::SearchIter<'_> {
        search::SearchIter::scan(self, 0..self.len(), None, None)
    }

    /// Serializes index builds. The lock guards no data, so a build that
    /// panicked leaves it usable.
    fn build_guard(&self) -> MutexGuard<'_, ()> {
        self.build_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds the object index (and, when configured, the predicate index) or
    /// returns the cached one. Concurrent callers build it once.
    pub fn generate_object_index(&self) -> Result<&IndexSet> {
        if let Some(indexes) = self.indexes.get() {
            return Ok(indexes);
        }
        let _guard = self.build_guard();
        if let Some(indexes) = self.indexes.get() {
            return Ok(indexes);
        }
        let built = crate::object_index::build(self, &self.options.object_index)?;
        Ok(self.indexes.get_or_init(|| built))
    }

    pub(crate) fn install_indexes(&self, indexes: IndexSet) -> &IndexSet {
        self.indexes.get_or_init(|| indexes)
    }
}

impl std::fmt::Debug for BitmapTriples {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapTriples")
            .field("order", &self.order)
            .field("triples", &self.len())
            .field("number_of_x", &self.number_of_x())
            .field("number_of_y", &self.number_of_y())
            .field("indexed", &self.indexes.get().is_some())
            .finish()
    }
}
