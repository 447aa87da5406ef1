//! K-way merging of sorted record streams, and an external sorter built on it.

use hdt_common::Result;

pub mod external_sort;
pub mod loser_tree;
pub mod sources;

pub use external_sort::ExternalSorter;
pub use loser_tree::LoserTree;
pub use sources::{IterSource, RunReader, VecSource};

/// A forward-only sorted stream that can take part in a k-way merge.
pub trait MergeSource {
    type Item;

    /// Current head of the stream, `None` once exhausted. The borrow is valid
    /// until the next [`advance`](Self::advance).
    fn peek(&self) -> Option<&Self::Item>;

    /// Moves past the current head.
    fn advance(&mut self) -> Result<()>;

    /// Items not consumed yet, including the head, when known.
    fn remaining(&self) -> Option<u64>;
}

impl<S: MergeSource + ?Sized> MergeSource for Box<S> {
    type Item = S::Item;

    fn peek(&self) -> Option<&Self::Item> {
        (**self).peek()
    }

    fn advance(&mut self) -> Result<()> {
        (**self).advance()
    }

    fn remaining(&self) -> Option<u64> {
        (**self).remaining()
    }
}
