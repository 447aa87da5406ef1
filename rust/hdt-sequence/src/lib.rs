//! Bit-packed integer sequences.
//!
//! A [`BitPackedSequence`] stores unsigned integers of a fixed bit width packed
//! across 64-bit words. The words live either in process memory or in a buffer
//! allocated from a [`hdt_io::TemporaryFileStore`]; the choice is made once, at
//! construction, through [`SequenceStorage`].

pub mod sequence;
pub mod storage;

pub use sequence::BitPackedSequence;
pub use storage::{SequenceStorage, WordStore};
