use std::io::{Read, Write};

use hdt_common::{Result, error::Error, verify_arg};

/// Byte transform applied to every spool chunk payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkCodec {
    Plain,
    #[default]
    Lz4,
    Zstd {
        level: i32,
    },
}

impl ChunkCodec {
    pub fn validate(&self) -> Result<()> {
        if let ChunkCodec::Zstd { level } = *self {
            verify_arg!(level, (1..=22).contains(&level));
        }
        Ok(())
    }

    /// Appends the encoded form of `bytes` to `target`.
    pub fn encode(&self, bytes: &[u8], target: &mut Vec<u8>) -> Result<()> {
        match *self {
            ChunkCodec::Plain => {
                target.extend_from_slice(bytes);
            }
            ChunkCodec::Lz4 => {
                let bound = lz4::block::compress_bound(bytes.len())
                    .map_err(|e| Error::io("LZ4 compress bound", e))?;
                let start = target.len();
                target.resize(start + bound, 0);
                let size = lz4::block::compress_to_buffer(
                    bytes,
                    Some(lz4::block::CompressionMode::FAST(1)),
                    false,
                    &mut target[start..],
                )
                .map_err(|e| Error::io("Failed to compress spool chunk with LZ4", e))?;
                target.truncate(start + size);
            }
            ChunkCodec::Zstd { level } => {
                let mut zstd = zstd::stream::write::Encoder::new(target, level)
                    .map_err(|e| Error::io("Failed to create ZSTD encoder", e))?;
                zstd.write_all(bytes)
                    .map_err(|e| Error::io("Failed to write ZSTD compressed data", e))?;
                zstd.finish()
                    .map_err(|e| Error::io("Failed to finish ZSTD encoder", e))?;
            }
        }
        Ok(())
    }

    /// Appends the decoded form of `encoded` to `target`, which must come to
    /// exactly `uncompressed_len` bytes.
    pub fn decode(&self, encoded: &[u8], uncompressed_len: usize, target: &mut Vec<u8>) -> Result<()> {
        let start = target.len();
        match *self {
            ChunkCodec::Plain => {
                target.extend_from_slice(encoded);
            }
            ChunkCodec::Lz4 => {
                target.resize(start + uncompressed_len, 0);
                let size = lz4::block::decompress_to_buffer(
                    encoded,
                    Some(uncompressed_len as i32),
                    &mut target[start..],
                )
                .map_err(|e| Error::io("Failed to decompress spool chunk with LZ4", e))?;
                target.truncate(start + size);
            }
            ChunkCodec::Zstd { .. } => {
                let mut zstd = zstd::stream::read::Decoder::new(encoded)
                    .map_err(|e| Error::io("Failed to create ZSTD decoder", e))?;
                zstd.read_to_end(target)
                    .map_err(|e| Error::io("Failed to read ZSTD compressed data", e))?;
            }
        }
        let decoded = target.len() - start;
        if decoded != uncompressed_len {
            return Err(Error::io_corrupted(format!(
                "spool chunk decoded to {decoded} bytes, expected {uncompressed_len}"
            )));
        }
        Ok(())
    }
}
