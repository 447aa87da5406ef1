//! HDT variable-length unsigned integers: seven payload bits per byte, least
//! significant group first, the high bit set on the final byte.

use std::io::{Read, Write};

use hdt_common::{Result, error::Error};

/// Longest encoding of a `u64`.
pub const MAX_VBYTE_LEN: usize = 10;

/// Encodes `value`, returning the buffer and the number of bytes used.
pub fn encode_vbyte(mut value: u64) -> ([u8; MAX_VBYTE_LEN], usize) {
    let mut buf = [0u8; MAX_VBYTE_LEN];
    let mut len = 0;
    while value > 0x7f {
        buf[len] = (value & 0x7f) as u8;
        value >>= 7;
        len += 1;
    }
    buf[len] = value as u8 | 0x80;
    (buf, len + 1)
}

pub fn write_vbyte<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let (buf, len) = encode_vbyte(value);
    writer
        .write_all(&buf[..len])
        .map_err(|e| Error::io("write vbyte", e))?;
    Ok(len)
}

/// Reads one value and appends its raw bytes to `raw`, so that callers can
/// include them in a header checksum.
pub fn read_vbyte<R: Read>(reader: &mut R, raw: &mut Vec<u8>) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VBYTE_LEN {
        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .map_err(|e| Error::io("read vbyte", e))?;
        raw.push(byte[0]);
        let bits = (byte[0] & 0x7f) as u64;
        let shift = 7 * i as u32;
        if shift == 63 && bits > 1 {
            return Err(Error::invalid_format_msg("vbyte", "value overflows 64 bits"));
        }
        value |= bits << shift;
        if byte[0] & 0x80 != 0 {
            return Ok(value);
        }
    }
    Err(Error::invalid_format_msg(
        "vbyte",
        "encoding longer than 10 bytes",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        let (buf, len) = encode_vbyte(0);
        assert_eq!(&buf[..len], &[0x80]);
        let (buf, len) = encode_vbyte(127);
        assert_eq!(&buf[..len], &[0xff]);
        let (buf, len) = encode_vbyte(128);
        assert_eq!(&buf[..len], &[0x00, 0x81]);
        let (buf, len) = encode_vbyte(300);
        assert_eq!(&buf[..len], &[0x2c, 0x82]);
    }

    #[test]
    fn test_read_back_extremes() {
        for value in [0, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            let written = write_vbyte(&mut out, value).unwrap();
            assert_eq!(written, out.len());
            let mut raw = Vec::new();
            assert_eq!(read_vbyte(&mut &out[..], &mut raw).unwrap(), value);
            assert_eq!(raw, out);
        }
    }

    #[test]
    fn test_truncated_input() {
        let mut raw = Vec::new();
        let err = read_vbyte(&mut &[0x01u8, 0x02][..], &mut raw).unwrap_err();
        assert!(matches!(
            err.kind(),
            hdt_common::error::ErrorKind::Io { .. }
        ));
    }
}
