//! Bit-level building blocks of the triple index.
//!
//! - [`bits`]: reading and writing fixed-width fields across 64-bit words.
//! - [`bitmap`]: an append-built bitmap that freezes into a [`SuccinctBitmap`]
//!   with constant-time `rank1` and sampled `select1`.

pub mod bitmap;
pub mod bits;

pub use bitmap::{BitmapBuilder, SuccinctBitmap};
