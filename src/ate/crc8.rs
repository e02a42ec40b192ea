//! CRC-8 used to seal allocation records
//!
//! Polynomial 0x07 (x^8 + x^2 + x + 1), MSB first, no reflection, no final
//! XOR, seeded with 0xFF.

use crc::{Algorithm, Crc};

/// Initial register value for allocation records
pub const ATE_CRC_SEED: u8 = 0xFF;

/// CRC-8/SMBUS polynomial with an all-ones seed
pub const CRC_8_ATE: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: ATE_CRC_SEED,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xFB,
    residue: 0x00,
};

const ATE_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_ATE);

/// CRC-8 of `data` as stored in a record's first byte
pub fn crc8(data: &[u8]) -> u8 {
    ATE_CRC.checksum(data)
}
