use crc::{CRC_8_SMBUS, CRC_16_ARC, CRC_32_ISCSI, Crc};

use hdt_common::{Result, error::Error};

/// Header checksum of sequence and bitmap containers.
pub static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Control block checksum.
pub static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Payload checksum (CRC32C).
pub static CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

pub fn check_crc8(element: &str, bytes: &[u8], expected: u8) -> Result<()> {
    if CRC8.checksum(bytes) != expected {
        return Err(Error::checksum_mismatch(element));
    }
    Ok(())
}

pub fn check_crc16(element: &str, bytes: &[u8], expected: u16) -> Result<()> {
    if CRC16.checksum(bytes) != expected {
        return Err(Error::checksum_mismatch(element));
    }
    Ok(())
}
