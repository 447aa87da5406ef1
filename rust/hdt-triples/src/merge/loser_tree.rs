use std::cmp::Ordering;

use hdt_common::Result;

use super::MergeSource;

/// Tournament tree of losers over `K` sorted sources.
///
/// Leaves are the sources, internal node `n` (`1..K`) keeps the loser of the
/// match played there and slot 0 keeps the overall winner. Advancing replays
/// only the path from the winner's leaf to the root. An exhausted source loses
/// every match; equal heads are won by the lower source index, which keeps the
/// merge stable.
pub struct LoserTree<S: MergeSource, C> {
    sources: Vec<S>,
    losers: Vec<usize>,
    cmp: C,
    total_len: Option<u64>,
}

impl<S, C> LoserTree<S, C>
where
    S: MergeSource,
    C: Fn(&S::Item, &S::Item) -> Ordering,
{
    pub fn new(sources: Vec<S>, cmp: C) -> Self {
        let k = sources.len();
        let total_len = sources
            .iter()
            .try_fold(0u64, |acc, s| s.remaining().map(|n| acc + n));
        let mut tree = LoserTree {
            sources,
            losers: vec![0; k.max(1)],
            cmp,
            total_len,
        };
        if k > 1 {
            let mut winners = vec![0usize; 2 * k];
            for (i, w) in winners[k..].iter_mut().enumerate() {
                *w = i;
            }
            for node in (1..k).rev() {
                let (left, right) = (winners[2 * node], winners[2 * node + 1]);
                if tree.beats(left, right) {
                    winners[node] = left;
                    tree.losers[node] = right;
                } else {
                    winners[node] = right;
                    tree.losers[node] = left;
                }
            }
            tree.losers[0] = winners[1];
        }
        tree
    }

    /// Number of merged sources.
    pub fn width(&self) -> usize {
        self.sources.len()
    }

    /// Sum of the source lengths at construction, or `None` when any source
    /// length is unknown.
    pub fn total_len(&self) -> Option<u64> {
        self.total_len
    }

    /// Index of the source currently holding the smallest head.
    pub fn winner(&self) -> usize {
        self.losers[0]
    }

    pub fn into_sources(self) -> Vec<S> {
        self.sources
    }

    /// `true` when source `a` wins against source `b`.
    #[inline]
    fn beats(&self, a: usize, b: usize) -> bool {
        match (self.sources[a].peek(), self.sources[b].peek()) {
            (Some(x), Some(y)) => match (self.cmp)(x, y) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => a < b,
            },
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => a < b,
        }
    }
}

impl<S, C> MergeSource for LoserTree<S, C>
where
    S: MergeSource,
    C: Fn(&S::Item, &S::Item) -> Ordering,
{
    type Item = S::Item;

    fn peek(&self) -> Option<&S::Item> {
        self.sources.get(self.losers[0])?.peek()
    }

    fn advance(&mut self) -> Result<()> {
        let k = self.sources.len();
        if k == 0 {
            return Ok(());
        }
        let mut winner = self.losers[0];
        self.sources[winner].advance()?;
        let mut node = (winner + k) / 2;
        while node >= 1 {
            let challenger = self.losers[node];
            if self.beats(challenger, winner) {
                self.losers[node] = winner;
                winner = challenger;
            }
            node /= 2;
        }
        self.losers[0] = winner;
        Ok(())
    }

    fn remaining(&self) -> Option<u64> {
        self.sources
            .iter()
            .try_fold(0u64, |acc, s| s.remaining().map(|n| acc + n))
    }
}

impl<S, C> Iterator for LoserTree<S, C>
where
    S: MergeSource,
    S::Item: Clone,
    C: Fn(&S::Item, &S::Item) -> Ordering,
{
    type Item = Result<S::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = MergeSource::peek(self)?.clone();
        if let Err(e) = MergeSource::advance(self) {
            return Some(Err(e));
        }
        Some(Ok(item))
    }
}

#[cfg(test)]
mod tests {
    use hdt_common::error::Error;

    use super::*;
    use crate::merge::{IterSource, VecSource};

    fn merge(inputs: Vec<Vec<(u32, u32)>>) -> Vec<(u32, u32)> {
        let sources = inputs.into_iter().map(VecSource::new).collect();
        let tree = LoserTree::new(sources, |a: &(u32, u32), b: &(u32, u32)| a.0.cmp(&b.0));
        tree.collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_merge_is_sorted_and_stable() {
        let merged = merge(vec![
            vec![(1, 0), (4, 0), (4, 1), (9, 0)],
            vec![(2, 1), (4, 2)],
            vec![],
            vec![(0, 3), (4, 3), (10, 3)],
            vec![(4, 4)],
        ]);
        let keys: Vec<u32> = merged.iter().map(|r| r.0).collect();
        assert_eq!(keys, vec![0, 1, 2, 4, 4, 4, 4, 4, 9, 10]);
        // Equal keys come out by source index, then by position within a source.
        let fours: Vec<u32> = merged.iter().filter(|r| r.0 == 4).map(|r| r.1).collect();
        assert_eq!(fours, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_degenerate_widths() {
        assert!(merge(vec![]).is_empty());
        assert_eq!(merge(vec![vec![(3, 0), (5, 0)]]), vec![(3, 0), (5, 0)]);
        assert!(merge(vec![vec![], vec![]]).is_empty());
    }

    #[test]
    fn test_random_merge_matches_sort() {
        let mut rng = fastrand::Rng::with_seed(11);
        for k in 1..12usize {
            let mut inputs = Vec::new();
            let mut all = Vec::new();
            for source in 0..k {
                let mut run: Vec<(u32, u32)> = (0..rng.usize(0..50))
                    .map(|_| (rng.u32(0..30), source as u32))
                    .collect();
                run.sort();
                all.extend(run.iter().copied());
                inputs.push(run);
            }
            all.sort();
            let sources: Vec<_> = inputs.into_iter().map(VecSource::new).collect();
            let tree = LoserTree::new(sources, |a: &(u32, u32), b: &(u32, u32)| a.cmp(b));
            assert_eq!(tree.total_len(), Some(all.len() as u64));
            let merged = tree.collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(merged, all);
        }
    }

    #[test]
    fn test_total_len_needs_every_source_length() {
        type Source = Box<dyn MergeSource<Item = (u32, u32)>>;
        let cmp = |a: &(u32, u32), b: &(u32, u32)| a.cmp(b);

        let exact: Vec<Source> = vec![
            Box::new(VecSource::new(vec![(1, 0), (3, 0)])),
            Box::new(IterSource::new(vec![(2, 1)].into_iter().map(Ok::<_, Error>)).unwrap()),
        ];
        let tree = LoserTree::new(exact, cmp);
        assert_eq!(tree.total_len(), Some(3));
        assert_eq!(tree.collect::<Result<Vec<_>>>().unwrap().len(), 3);

        // A filtered iterator only has an upper bound.
        let filtered: Vec<Source> = vec![
            Box::new(VecSource::new(vec![(1, 0), (3, 0)])),
            Box::new(
                IterSource::new((0..10u32).filter(|n| n % 3 == 0).map(|n| Ok::<_, Error>((n, 1))))
                    .unwrap(),
            ),
        ];
        let tree = LoserTree::new(filtered, cmp);
        assert_eq!(tree.total_len(), None);
        let merged = tree.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(merged, vec![(0, 1), (1, 0), (3, 0), (3, 1), (6, 1), (9, 1)]);
    }
}
