//! CRC-8 checksum for link frames.
//!
//! Polynomial 0x07, initial value 0x00, no reflection, no xor-out - the
//! CRC-8/SMBUS parameter set, computed with a 256-byte lookup table.

use crc::{Crc, CRC_8_SMBUS};

/// CRC-8/SMBUS calculator with 256-byte lookup table.
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Calculate the CRC-8 checksum of a byte slice.
#[inline]
#[must_use]
pub fn calculate_crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}
