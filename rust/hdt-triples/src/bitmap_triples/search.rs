//! Triple pattern search.
//!
//! A pattern is a [`TripleId`] with 0 for unbound components. Laid out in the
//! native order as `(x, y, z)`, the bound components form a 3-bit mask
//! (`x` = 4, `y` = 2, `z` = 1). Masks `000`, `100`, `110`, `111` and `101` are
//! served by walking the two levels directly; the rest need the predicate
//! index (`?y?`), the object index (`?yz`, `??z`), a cached index in another
//! order, or a filtered scan.

use std::ops::Range;

use hdt_common::Result;

use super::BitmapTriples;
use crate::{
    object_index::{ObjectIndex, PredicateIndex},
    order::{OrderSet, TripleOrder},
    triple::TripleId,
};

const X: u8 = 4;
const Y: u8 = 2;
const Z: u8 = 1;

fn pattern_mask(xyz: [u64; 3]) -> u8 {
    let mut mask = 0;
    if xyz[0] != 0 {
        mask |= X;
    }
    if xyz[1] != 0 {
        mask |= Y;
    }
    if xyz[2] != 0 {
        mask |= Z;
    }
    mask
}

/// `true` when the levels alone answer the mask.
fn is_native(mask: u8) -> bool {
    mask == 0 || mask & X != 0
}

fn mask_name(mask: u8) -> String {
    [(X, 'x'), (Y, 'y'), (Z, 'z')]
        .iter()
        .map(|&(bit, c)| if mask & bit != 0 { c } else { '?' })
        .collect()
}

impl BitmapTriples {
    /// Finds every triple matching `pattern`.
    ///
    /// The result is produced in one of the `acceptable` orders when an
    /// index for it is available (the empty set accepts any). When none is,
    /// the search still answers, in whatever order it can, and logs a
    /// warning.
    pub fn search(&self, pattern: &TripleId, acceptable: OrderSet) -> Result<SearchIter<'_>> {
        let native = self.order.to_layout(pattern);
        let mask = pattern_mask(native);
        if is_native(mask) && acceptable.contains(self.order) {
            return self.search_native(native);
        }

        for order in acceptable.iter().filter(|&o| o != self.order) {
            if let Some(secondary) = self.secondary(order) {
                let layout = order.to_layout(pattern);
                if is_native(pattern_mask(layout)) {
                    let inner = secondary.search_native(layout)?;
                    return Ok(SearchIter::secondary(inner));
                }
            }
        }

        if let Some(iter) = self.search_indexed(native, mask, acceptable)? {
            return Ok(iter);
        }

        if is_native(mask) {
            log::warn!(
                "pattern {} in {}: no index in an acceptable order, answering in native order",
                mask_name(mask),
                self.order
            );
            return self.search_native(native);
        }
        if let Some(iter) = self.search_indexed(native, mask, OrderSet::ANY)? {
            log::warn!(
                "pattern {} in {}: no index in an acceptable order, answering in {}",
                mask_name(mask),
                self.order,
                iter.order()
            );
            return Ok(iter);
        }
        log::warn!(
            "pattern {} in {}: no index built, scanning {} triples",
            mask_name(mask),
            self.order,
            self.len()
        );
        Ok(SearchIter::scan(
            self,
            0..self.len(),
            nonzero(native[1]),
            nonzero(native[2]),
        ))
    }

    /// Serves a native mask; `xyz` is the pattern in this index's layout.
    fn search_native(&self, xyz: [u64; 3]) -> Result<SearchIter<'_>> {
        let [x, y, z] = xyz;
        if x == 0 {
            return Ok(SearchIter::scan(self, 0..self.len(), None, None));
        }
        let Some(ys) = self.adjacency_y().list_range(x - 1) else {
            return Ok(SearchIter::empty(self.order));
        };
        let adjacency_z = self.adjacency_z();
        if y == 0 {
            let start = adjacency_z
                .list_range(ys.start)
                .map_or(self.len(), |r| r.start);
            let end = adjacency_z
                .list_range(ys.end - 1)
                .map_or(self.len(), |r| r.end);
            return Ok(SearchIter::scan(self, start..end, None, nonzero(z)));
        }
        let Some(pos_y) = self.adjacency_y().binary_search(ys, y)? else {
            return Ok(SearchIter::empty(self.order));
        };
        let Some(zs) = adjacency_z.list_range(pos_y) else {
            return Ok(SearchIter::empty(self.order));
        };
        let zs = if z == 0 {
            zs
        } else {
            let start = adjacency_z.lower_bound(zs.clone(), z)?;
            let end = adjacency_z.upper_bound(start..zs.end, z)?;
            start..end
        };
        Ok(SearchIter::scan(self, zs, None, None))
    }

    /// Serves `?y?` with the predicate index and `?yz`/`??z` with the object
    /// index, when built and their result order is in `acceptable`.
    fn search_indexed(
        &self,
        xyz: [u64; 3],
        mask: u8,
        acceptable: OrderSet,
    ) -> Result<Option<SearchIter<'_>>> {
        let Some(indexes) = self.indexes() else {
            return Ok(None);
        };
        let [cx, cy, cz] = self.order.components();
        match mask {
            m if m == Y => {
                let order = TripleOrder::from_components([cy, cx, cz]);
                match indexes.predicate() {
                    Some(index) if acceptable.contains(order) => {
                        Ok(Some(SearchIter::predicate(self, index, order, xyz[1])))
                    }
                    _ => Ok(None),
                }
            }
            m if m == Y | Z || m == Z => {
                let order = TripleOrder::from_components([cz, cy, cx]);
                if !acceptable.contains(order) {
                    return Ok(None);
                }
                let iter = SearchIter::object(self, indexes.object(), order, xyz[2], nonzero(xyz[1]))?;
                Ok(Some(iter))
            }
            _ => Ok(None),
        }
    }
}

fn nonzero(value: u64) -> Option<u64> {
    (value != 0).then_some(value)
}

/// Lazy stream of search results.
///
/// Yields `Result<TripleId>`; after the first error the iterator is
/// exhausted.
pub struct SearchIter<'a> {
    order: TripleOrder,
    estimated_len: u64,
    state: State<'a>,
}

enum State<'a> {
    Empty,
    Scan(ScanIter<'a>),
    Object(ObjectIter<'a>),
    Predicate(PredicateIter<'a>),
    Secondary(Box<SearchIter<'a>>),
}

impl<'a> SearchIter<'a> {
    fn empty(order: TripleOrder) -> SearchIter<'a> {
        SearchIter {
            order,
            estimated_len: 0,
            state: State::Empty,
        }
    }

    /// Walks the Z positions in `range`, keeping only triples whose `y` and
    /// `z` (in native layout) equal the given filters.
    pub fn scan(
        bt: &'a BitmapTriples,
        range: Range<u64>,
        y_filter: Option<u64>,
        z_filter: Option<u64>,
    ) -> SearchIter<'a> {
        let end = range.end.min(bt.len());
        let start = range.start.min(end);
        let pos_y = bt.adjacency_z().find_list_index(start);
        let x = bt.adjacency_y().find_list_index(pos_y) + 1;
        SearchIter {
            order: bt.order,
            estimated_len: end - start,
            state: State::Scan(ScanIter {
                bt,
                pos_z: start,
                end,
                pos_y,
                x,
                y: None,
                y_filter,
                z_filter,
            }),
        }
    }

    fn object(
        bt: &'a BitmapTriples,
        index: &'a ObjectIndex,
        order: TripleOrder,
        z: u64,
        y_filter: Option<u64>,
    ) -> Result<SearchIter<'a>> {
        let Some(mut range) = index.list_range(z) else {
            return Ok(SearchIter::empty(order));
        };
        if let Some(y) = y_filter {
            let start = object_bound(bt, index, range.clone(), y, false)?;
            let end = object_bound(bt, index, start..range.end, y, true)?;
            range = start..end;
        }
        Ok(SearchIter {
            order,
            estimated_len: range.end - range.start,
            state: State::Object(ObjectIter {
                bt,
                index,
                z,
                pos: range.start,
                end: range.end,
            }),
        })
    }

    fn predicate(
        bt: &'a BitmapTriples,
        index: &'a PredicateIndex,
        order: TripleOrder,
        y: u64,
    ) -> SearchIter<'a> {
        let Some(range) = index.list_range(y) else {
            return SearchIter::empty(order);
        };
        // Average Z list length times the number of Y positions.
        let estimated_len =
            (range.end - range.start).saturating_mul(bt.len()) / bt.number_of_y().max(1);
        SearchIter {
            order,
            estimated_len,
            state: State::Predicate(PredicateIter {
                bt,
                index,
                y,
                pos: range.start,
                end: range.end,
                current: None,
            }),
        }
    }

    fn secondary(inner: SearchIter<'a>) -> SearchIter<'a> {
        SearchIter {
            order: inner.order,
            estimated_len: inner.estimated_len,
            state: State::Secondary(Box::new(inner)),
        }
    }

    /// Order the results are sorted in.
    pub fn order(&self) -> TripleOrder {
        self.order
    }

    /// Upper bound on the number of results; exact for unfiltered native
    /// patterns and object-index lookups.
    pub fn estimated_len(&self) -> u64 {
        self.estimated_len
    }

    fn next_triple(&mut self) -> Result<Option<TripleId>> {
        match &mut self.state {
            State::Empty => Ok(None),
            State::Scan(scan) => scan.next_triple(),
            State::Object(object) => object.next_triple(),
            State::Predicate(predicate) => predicate.next_triple(),
            State::Secondary(inner) => inner.next_triple(),
        }
    }
}

impl Iterator for SearchIter<'_> {
    type Item = Result<TripleId>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_triple() {
            Ok(Some(triple)) => Some(Ok(triple)),
            Ok(None) => {
                self.state = State::Empty;
                None
            }
            Err(e) => {
                self.state = State::Empty;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for SearchIter<'_> {}

/// Sequential walk of a Z range. `pos_y` and `x` advance with the list ends
/// marked in the bitmaps instead of being recomputed per triple.
struct ScanIter<'a> {
    bt: &'a BitmapTriples,
    pos_z: u64,
    end: u64,
    pos_y: u64,
    x: u64,
    y: Option<u64>,
    y_filter: Option<u64>,
    z_filter: Option<u64>,
}

impl ScanIter<'_> {
    fn next_triple(&mut self) -> Result<Option<TripleId>> {
        while self.pos_z < self.end {
            let y = match self.y {
                Some(y) => y,
                None => {
                    let y = self.bt.seq_y.get(self.pos_y)?;
                    self.y = Some(y);
                    y
                }
            };
            if self.y_filter.is_some_and(|f| f != y) {
                // Skip the rest of this Z list.
                let last = self
                    .bt
                    .bitmap_z
                    .select_next1(self.pos_z)
                    .unwrap_or(self.end - 1);
                self.pos_z = last;
                self.step();
                continue;
            }
            let x = self.x;
            let z = self.bt.seq_z.get(self.pos_z)?;
            self.step();
            if self.z_filter.is_some_and(|f| f != z) {
                continue;
            }
            return Ok(Some(self.bt.order.from_layout([x, y, z])));
        }
        Ok(None)
    }

    /// Moves past `pos_z`, following list ends up the levels.
    fn step(&mut self) {
        if self.bt.bitmap_z.get(self.pos_z) {
            if self.bt.bitmap_y.get(self.pos_y) {
                self.x += 1;
            }
            self.pos_y += 1;
            self.y = None;
        }
        self.pos_z += 1;
    }
}

/// One object's slice of the object index, in `(y, pos_y)` order.
struct ObjectIter<'a> {
    bt: &'a BitmapTriples,
    index: &'a ObjectIndex,
    z: u64,
    pos: u64,
    end: u64,
}

impl ObjectIter<'_> {
    fn next_triple(&mut self) -> Result<Option<TripleId>> {
        if self.pos >= self.end {
            return Ok(None);
        }
        let pos_y = self.index.sequence().get(self.pos)?;
        self.pos += 1;
        let y = self.bt.seq_y.get(pos_y)?;
        let x = self.bt.adjacency_y().find_list_index(pos_y) + 1;
        Ok(Some(self.bt.order.from_layout([x, y, self.z])))
    }
}

/// First position in an object's `range` whose `y` is `>= y` (or `> y` when
/// `upper`). The range is sorted by `y`.
fn object_bound(
    bt: &BitmapTriples,
    index: &ObjectIndex,
    range: Range<u64>,
    y: u64,
    upper: bool,
) -> Result<u64> {
    let (mut lo, mut hi) = (range.start, range.end);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let found = bt.seq_y.get(index.sequence().get(mid)?)?;
        if found < y || (upper && found == y) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// Y positions holding one predicate, each expanded to its Z list.
struct PredicateIter<'a> {
    bt: &'a BitmapTriples,
    index: &'a PredicateIndex,
    y: u64,
    pos: u64,
    end: u64,
    current: Option<(u64, Range<u64>)>,
}

impl PredicateIter<'_> {
    fn next_triple(&mut self) -> Result<Option<TripleId>> {
        loop {
            if let Some((x, zs)) = &mut self.current {
                if let Some(pos_z) = zs.next() {
                    let z = self.bt.seq_z.get(pos_z)?;
                    return Ok(Some(self.bt.order.from_layout([*x, self.y, z])));
                }
                self.current = None;
            }
            if self.pos >= self.end {
                return Ok(None);
            }
            let pos_y = self.index.sequence().get(self.pos)?;
            self.pos += 1;
            let x = self.bt.adjacency_y().find_list_index(pos_y) + 1;
            let zs = self.bt.adjacency_z().list_range(pos_y).unwrap_or(0..0);
            self.current = Some((x, zs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TriplesOptions;

    fn sample() -> BitmapTriples {
        let triples = [
            (1, 1, 1),
            (1, 1, 2),
            (1, 2, 1),
            (1, 2, 3),
            (2, 1, 3),
            (2, 3, 2),
            (3, 2, 1),
            (3, 2, 2),
        ]
        .map(TripleId::from);
        BitmapTriples::load(TripleOrder::Spo, triples, TriplesOptions::default()).unwrap()
    }

    fn collect(iter: SearchIter<'_>) -> Vec<(u64, u64, u64)> {
        iter.map(|t| {
            let t = t.unwrap();
            (t.subject, t.predicate, t.object)
        })
        .collect()
    }

    fn search(bt: &BitmapTriples, s: u64, p: u64, o: u64) -> Vec<(u64, u64, u64)> {
        collect(bt.search(&TripleId::new(s, p, o), OrderSet::ANY).unwrap())
    }

    #[test]
    fn test_native_patterns() {
        let bt = sample();
        assert_eq!(search(&bt, 0, 0, 0).len(), 8);
        assert_eq!(
            search(&bt, 1, 0, 0),
            vec![(1, 1, 1), (1, 1, 2), (1, 2, 1), (1, 2, 3)]
        );
        assert_eq!(search(&bt, 2, 3, 0), vec![(2, 3, 2)]);
        assert_eq!(search(&bt, 3, 2, 2), vec![(3, 2, 2)]);
        assert_eq!(search(&bt, 1, 0, 1), vec![(1, 1, 1), (1, 2, 1)]);
        assert!(search(&bt, 4, 0, 0).is_empty());
        assert!(search(&bt, 2, 2, 0).is_empty());
        assert!(search(&bt, 3, 2, 5).is_empty());
    }

    #[test]
    fn test_estimated_len() {
        let bt = sample();
        let iter = bt.search(&TripleId::new(1, 0, 0), OrderSet::ANY).unwrap();
        assert_eq!(iter.estimated_len(), 4);
        assert_eq!(iter.order(), TripleOrder::Spo);
    }

    #[test]
    fn test_unindexed_patterns_scan() {
        let bt = sample();
        assert_eq!(
            search(&bt, 0, 2, 0),
            vec![(1, 2, 1), (1, 2, 3), (3, 2, 1), (3, 2, 2)]
        );
        assert_eq!(search(&bt, 0, 2, 1), vec![(1, 2, 1), (3, 2, 1)]);
        assert_eq!(search(&bt, 0, 0, 3), vec![(1, 2, 3), (2, 1, 3)]);
    }

    #[test]
    fn test_indexed_patterns() {
        let bt = sample();
        bt.generate_object_index().unwrap();

        let iter = bt.search(&TripleId::new(0, 0, 1), OrderSet::ANY).unwrap();
        assert_eq!(iter.order(), TripleOrder::Ops);
        assert_eq!(collect(iter), vec![(1, 1, 1), (1, 2, 1), (3, 2, 1)]);

        let iter = bt.search(&TripleId::new(0, 2, 2), OrderSet::ANY).unwrap();
        assert_eq!(collect(iter), vec![(3, 2, 2)]);

        let iter = bt.search(&TripleId::new(0, 2, 0), OrderSet::ANY).unwrap();
        assert_eq!(iter.order(), TripleOrder::Pso);
        assert_eq!(
            collect(iter),
            vec![(1, 2, 1), (1, 2, 3), (3, 2, 1), (3, 2, 2)]
        );

        assert!(search(&bt, 0, 0, 9).is_empty());
        assert!(search(&bt, 0, 9, 0).is_empty());
    }

    #[test]
    fn test_unacceptable_native_order_is_still_answered() {
        let bt = sample();
        let iter = bt
            .search(&TripleId::new(1, 0, 0), OrderSet::single(TripleOrder::Pos))
            .unwrap();
        assert_eq!(iter.order(), TripleOrder::Spo);
        assert_eq!(iter.count(), 4);
    }
}
