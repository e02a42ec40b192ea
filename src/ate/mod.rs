//! Allocation Table Entry (ATE) Module
//!
//! Fixed-size records describing one stored value-version or one sector
//! lifecycle event.
//!
//! ## Responsibilities
//! - Bit-exact encoding/decoding of the 16-byte record
//! - CRC-8 sealing and validation against an expected generation
//! - Recognizing the EMPTY, CLOSE and GC-done lifecycle markers
//!
//! ## Record Format (little-endian)
//! ```text
//! ┌────────┬────────┬─────────┬─────────┬──────────────────────────────┐
//! │ CRC (1)│ Gen (1)│ Len (2) │ Key (4) │ Payload (8)                  │
//! └────────┴────────┴─────────┴─────────┴──────────────────────────────┘
//!   Payload, Len <= 8 : value bytes, zero padded
//!   Payload, Len >  8 : Offset (4) | Data CRC-32 or metadata (4)
//! ```
//!
//! ## Sector Layout
//! ```text
//! offset 0                                             sector_size
//! ┌──────────────────────┬─────────┬──────────────┬───────┬───────┐
//! │ data (grows up) ──▶  │  free   │ ◀── records  │ CLOSE │ EMPTY │
//! └──────────────────────┴─────────┴──────────────┴───────┴───────┘
//! ```

mod crc8;
mod generation;
mod record;

pub use crc8::{crc8, ATE_CRC_SEED, CRC_8_ATE};
pub use generation::Generation;
pub use record::{Ate, AtePayload};

// =============================================================================
// Shared Constants
// =============================================================================

/// Encoded record size before alignment to the device write block
pub const ATE_SIZE: usize = 16;

/// Longest value stored directly inside the record
pub const INLINE_DATA_SIZE: usize = 8;

/// Key reserved for lifecycle markers (EMPTY, CLOSE, GC-done)
pub const RESERVED_KEY: u32 = u32::MAX;

/// Length value carried by the EMPTY marker
pub const EMPTY_MARKER_LEN: u16 = u16::MAX;

/// Format magic stored in bits 15..8 of the EMPTY marker's metadata
pub const MAGIC: u8 = 0x42;

/// Layout version stored in bits 7..0 of the EMPTY marker's metadata
pub const FORMAT_VERSION: u8 = 1;
