//! Self-describing containers of packed sequences and bitmaps.
//!
//! Both start with a small header (type tag, optional bit width, vbyte element
//! count) protected by a CRC8, followed by a little-endian payload and a CRC32C
//! trailer over the payload.

use std::io::{Read, Write};

use hdt_common::{Result, error::Error, verify_data};

use crate::{
    checksum::{CRC32C, check_crc8},
    vbyte::{encode_vbyte, read_vbyte},
};

/// Type tag of a log (bit-packed) sequence container.
pub const SEQUENCE_TYPE_LOG: u8 = 1;

/// Type tag of a plain bitmap container.
pub const BITMAP_TYPE_PLAIN: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub bit_width: u8,
    pub len: u64,
}

impl SequenceHeader {
    /// Size of the packed payload in bytes.
    pub fn payload_len(&self) -> Result<u64> {
        let bits = (self.bit_width as u128) * (self.len as u128);
        u64::try_from(bits.div_ceil(8)).map_err(|_| {
            Error::invalid_format_msg("sequence", format!("payload of {bits} bits"))
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut header = Vec::with_capacity(12);
        header.push(SEQUENCE_TYPE_LOG);
        header.push(self.bit_width);
        let (len, n) = encode_vbyte(self.len);
        header.extend_from_slice(&len[..n]);
        header.push(crate::checksum::CRC8.checksum(&header));
        writer
            .write_all(&header)
            .map_err(|e| Error::io("write sequence header", e))
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<SequenceHeader> {
        let mut header = [0u8; 2];
        reader
            .read_exact(&mut header)
            .map_err(|e| Error::io("read sequence header", e))?;
        let mut raw = header.to_vec();
        let (kind, bit_width) = (header[0], header[1]);
        if kind != SEQUENCE_TYPE_LOG {
            return Err(Error::invalid_format_msg(
                "sequence",
                format!("unsupported sequence type {kind}"),
            ));
        }
        verify_data!(bit_width, bit_width <= 64);
        let len = read_vbyte(reader, &mut raw)?;
        let crc = read_u8(reader, "read sequence header crc")?;
        check_crc8("sequence header", &raw, crc)?;
        Ok(SequenceHeader { bit_width, len })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapHeader {
    pub len: u64,
}

impl BitmapHeader {
    pub fn payload_len(&self) -> u64 {
        self.len.div_ceil(8)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut header = Vec::with_capacity(12);
        header.push(BITMAP_TYPE_PLAIN);
        let (len, n) = encode_vbyte(self.len);
        header.extend_from_slice(&len[..n]);
        header.push(crate::checksum::CRC8.checksum(&header));
        writer
            .write_all(&header)
            .map_err(|e| Error::io("write bitmap header", e))
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<BitmapHeader> {
        let kind = read_u8(reader, "read bitmap header")?;
        if kind != BITMAP_TYPE_PLAIN {
            return Err(Error::invalid_format_msg(
                "bitmap",
                format!("unsupported bitmap type {kind}"),
            ));
        }
        let mut raw = vec![kind];
        let len = read_vbyte(reader, &mut raw)?;
        let crc = read_u8(reader, "read bitmap header crc")?;
        check_crc8("bitmap header", &raw, crc)?;
        Ok(BitmapHeader { len })
    }
}

/// Writes a payload while accumulating its CRC32C; `finish` appends the trailer.
pub struct PayloadWriter<'a, W: Write> {
    writer: &'a mut W,
    digest: crc::Digest<'static, u32>,
    written: u64,
}

impl<'a, W: Write> PayloadWriter<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        PayloadWriter {
            writer,
            digest: CRC32C.digest(),
            written: 0,
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| Error::io("write payload", e))?;
        self.digest.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Writes the trailer and returns the payload length.
    pub fn finish(self) -> Result<u64> {
        let crc = self.digest.finalize();
        self.writer
            .write_all(&crc.to_le_bytes())
            .map_err(|e| Error::io("write payload crc", e))?;
        Ok(self.written)
    }
}

/// Reads exactly `len` payload bytes and verifies the CRC32C trailer.
pub struct PayloadReader<'a, R: Read> {
    reader: &'a mut R,
    digest: crc::Digest<'static, u32>,
    remaining: u64,
    element: &'static str,
}

impl<'a, R: Read> PayloadReader<'a, R> {
    pub fn new(reader: &'a mut R, len: u64, element: &'static str) -> Self {
        PayloadReader {
            reader,
            digest: CRC32C.digest(),
            remaining: len,
            element,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 > self.remaining {
            return Err(Error::invalid_format_msg(
                self.element,
                format!(
                    "read of {} bytes exceeds remaining payload of {}",
                    buf.len(),
                    self.remaining
                ),
            ));
        }
        self.reader.read_exact(buf).map_err(|e| {
            Error::io(
                format!("{} payload, {} bytes remaining", self.element, self.remaining),
                e,
            )
        })?;
        self.digest.update(buf);
        self.remaining -= buf.len() as u64;
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        if self.remaining != 0 {
            return Err(Error::invalid_format_msg(
                self.element,
                format!("{} payload bytes left unread", self.remaining),
            ));
        }
        let mut crc = [0u8; 4];
        self.reader
            .read_exact(&mut crc)
            .map_err(|e| Error::io(format!("{} payload crc", self.element), e))?;
        if u32::from_le_bytes(crc) != self.digest.finalize() {
            return Err(Error::checksum_mismatch(self.element));
        }
        Ok(())
    }
}

fn read_u8<R: Read>(reader: &mut R, context: &str) -> Result<u8> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .map_err(|e| Error::io(context, e))?;
    Ok(byte[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_header() {
        let header = SequenceHeader {
            bit_width: 13,
            len: 1000,
        };
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        assert_eq!(out[0], SEQUENCE_TYPE_LOG);
        assert_eq!(out[1], 13);
        assert_eq!(SequenceHeader::read(&mut &out[..]).unwrap(), header);
        assert_eq!(header.payload_len().unwrap(), 1625);

        out[1] = 14;
        let err = SequenceHeader::read(&mut &out[..]).unwrap_err();
        assert!(err.is_format_violation());
    }

    #[test]
    fn test_bitmap_header_rejects_unknown_type() {
        let mut out = Vec::new();
        BitmapHeader { len: 9 }.write(&mut out).unwrap();
        assert_eq!(BitmapHeader::read(&mut &out[..]).unwrap().payload_len(), 2);
        out[0] = 2;
        assert!(BitmapHeader::read(&mut &out[..]).is_err());
    }

    #[test]
    fn test_payload_crc() {
        let mut out = Vec::new();
        let mut w = PayloadWriter::new(&mut out);
        w.write_all(b"0123456789").unwrap();
        assert_eq!(w.finish().unwrap(), 10);
        assert_eq!(out.len(), 14);

        let mut input = &out[..];
        let mut r = PayloadReader::new(&mut input, 10, "test");
        let mut buf = [0u8; 10];
        r.read_exact(&mut buf).unwrap();
        r.finish().unwrap();

        out[3] ^= 0xff;
        let mut input = &out[..];
        let mut r = PayloadReader::new(&mut input, 10, "test");
        r.read_exact(&mut buf).unwrap();
        let err = r.finish().unwrap_err();
        assert!(matches!(
            err.kind(),
            hdt_common::error::ErrorKind::ChecksumMismatch { .. }
        ));
    }
}
