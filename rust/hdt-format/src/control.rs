//! Control blocks introducing every persisted HDT section.
//!
//! Layout: the `$HDT` cookie, a type byte, a NUL-terminated format URI, a
//! NUL-terminated `key=value;` property list, and a CRC16 over all of the
//! preceding bytes.

use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
};

use hdt_common::{Result, error::Error, error::FormatViolation};

use crate::checksum::{CRC16, check_crc16};

const COOKIE: &[u8; 4] = b"$HDT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlType {
    Unknown = 0,
    Global = 1,
    Header = 2,
    Dictionary = 3,
    Triples = 4,
    Index = 5,
}

impl ControlType {
    pub fn from_u8(value: u8) -> Option<ControlType> {
        Some(match value {
            0 => ControlType::Unknown,
            1 => ControlType::Global,
            2 => ControlType::Header,
            3 => ControlType::Dictionary,
            4 => ControlType::Triples,
            5 => ControlType::Index,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock {
    pub control_type: ControlType,
    pub format: String,
    pub properties: BTreeMap<String, String>,
}

impl ControlBlock {
    pub fn new(control_type: ControlType, format: impl Into<String>) -> ControlBlock {
        ControlBlock {
            control_type,
            format: format.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl ToString) -> ControlBlock {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Parses a numeric property, failing when it is absent or malformed.
    pub fn u64_property(&self, key: &str) -> Result<u64> {
        let value = self.property(key).ok_or_else(|| {
            Error::invalid_format_msg("control block", format!("missing property '{key}'"))
        })?;
        value.parse().map_err(|_| {
            Error::invalid_format_msg(
                "control block",
                format!("property '{key}' is not a number: '{value}'"),
            )
        })
    }

    /// Fails with a `ControlMismatch` violation unless the block has the
    /// given type and format.
    pub fn expect(&self, control_type: ControlType, format: &str) -> Result<()> {
        if self.control_type != control_type {
            return Err(FormatViolation::ControlMismatch {
                field: "type".to_string(),
                expected: format!("{control_type:?}"),
                found: format!("{:?}", self.control_type),
            }
            .into());
        }
        if self.format != format {
            return Err(FormatViolation::ControlMismatch {
                field: "format".to_string(),
                expected: format.to_string(),
                found: self.format.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut block = Vec::with_capacity(64 + self.format.len());
        block.extend_from_slice(COOKIE);
        block.push(self.control_type as u8);
        block.extend_from_slice(self.format.as_bytes());
        block.push(0);
        for (key, value) in &self.properties {
            block.extend_from_slice(key.as_bytes());
            block.push(b'=');
            block.extend_from_slice(value.as_bytes());
            block.push(b';');
        }
        block.push(0);
        let crc = CRC16.checksum(&block);
        block.extend_from_slice(&crc.to_le_bytes());
        writer
            .write_all(&block)
            .map_err(|e| Error::io("write control block", e))
    }

    pub fn read<R: BufRead>(reader: &mut R) -> Result<ControlBlock> {
        let mut raw = vec![0u8; 5];
        reader
            .read_exact(&mut raw)
            .map_err(|e| Error::io("read control block", e))?;
        if &raw[..4] != COOKIE {
            return Err(FormatViolation::ControlMismatch {
                field: "cookie".to_string(),
                expected: "$HDT".to_string(),
                found: String::from_utf8_lossy(&raw[..4]).into_owned(),
            }
            .into());
        }
        let control_type = ControlType::from_u8(raw[4]).ok_or_else(|| {
            Error::invalid_format_msg("control block", format!("unknown type {}", raw[4]))
        })?;

        let format = read_terminated(reader, &mut raw)?;
        let properties_text = read_terminated(reader, &mut raw)?;

        let mut crc = [0u8; 2];
        reader
            .read_exact(&mut crc)
            .map_err(|e| Error::io("read control block crc", e))?;
        check_crc16("control block", &raw, u16::from_le_bytes(crc))?;

        let mut properties = BTreeMap::new();
        for entry in properties_text.split(';').filter(|e| !e.is_empty()) {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                Error::invalid_format_msg("control block", format!("malformed property '{entry}'"))
            })?;
            properties.insert(key.to_string(), value.to_string());
        }
        Ok(ControlBlock {
            control_type,
            format,
            properties,
        })
    }
}

fn read_terminated<R: BufRead>(reader: &mut R, raw: &mut Vec<u8>) -> Result<String> {
    let mut buf = Vec::new();
    reader
        .read_until(0, &mut buf)
        .map_err(|e| Error::io("read control block", e))?;
    raw.extend_from_slice(&buf);
    if buf.pop() != Some(0) {
        return Err(Error::io(
            "read control block",
            std::io::ErrorKind::UnexpectedEof.into(),
        ));
    }
    String::from_utf8(buf)
        .map_err(|_| Error::invalid_format_msg("control block", "text is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HDT_TRIPLES_BITMAP;

    #[test]
    fn test_control_block_round_trip() {
        let block = ControlBlock::new(ControlType::Triples, HDT_TRIPLES_BITMAP)
            .with_property("order", 1)
            .with_property("numTriples", 42);
        let mut out = Vec::new();
        block.write(&mut out).unwrap();
        assert_eq!(&out[..4], b"$HDT");
        assert_eq!(out[4], 4);

        let read = ControlBlock::read(&mut &out[..]).unwrap();
        assert_eq!(read, block);
        assert_eq!(read.u64_property("numTriples").unwrap(), 42);
        read.expect(ControlType::Triples, HDT_TRIPLES_BITMAP).unwrap();
    }

    #[test]
    fn test_control_block_mismatches() {
        let block = ControlBlock::new(ControlType::Index, crate::HDT_INDEX_FOQ);
        let err = block
            .expect(ControlType::Triples, HDT_TRIPLES_BITMAP)
            .unwrap_err();
        assert!(matches!(
            err.format_violation(),
            Some(FormatViolation::ControlMismatch { field, .. }) if field == "type"
        ));

        let mut out = Vec::new();
        block.write(&mut out).unwrap();
        out[0] = b'#';
        assert!(ControlBlock::read(&mut &out[..]).unwrap_err().is_format_violation());
    }

    #[test]
    fn test_corrupted_property_fails_crc() {
        let block = ControlBlock::new(ControlType::Triples, HDT_TRIPLES_BITMAP)
            .with_property("order", 1);
        let mut out = Vec::new();
        block.write(&mut out).unwrap();
        let pos = out.iter().position(|&b| b == b'1').unwrap();
        out[pos] = b'2';
        let err = ControlBlock::read(&mut &out[..]).unwrap_err();
        assert!(matches!(
            err.kind(),
            hdt_common::error::ErrorKind::ChecksumMismatch { .. }
        ));
    }
}
