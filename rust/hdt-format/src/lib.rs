//! Framing of the persisted HDT sections: variable-length integers, checksums,
//! sequence and bitmap container headers, and control blocks.

pub mod checksum;
pub mod container;
pub mod control;
pub mod vbyte;

pub use container::{BitmapHeader, PayloadReader, PayloadWriter, SequenceHeader};
pub use control::{ControlBlock, ControlType};

/// Format URI of a BitmapTriples section.
pub const HDT_TRIPLES_BITMAP: &str = "<http://purl.org/HDT/hdt#triplesBitmap>";

/// Format URI of a triples index file.
pub const HDT_INDEX_FOQ: &str = "<http://purl.org/HDT/hdt#indexFoQ>";
