//! Logical store addresses
//!
//! An address names a byte inside the managed region as a
//! `(sector, offset)` pair. On the wire (and in the lookup cache) it packs
//! into a `u64` with the sector in the high 32 bits.

use std::fmt;

/// A `(sector, offset-within-sector)` location
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub sector: u32,
    pub offset: u32,
}

impl Address {
    pub const fn new(sector: u32, offset: u32) -> Self {
        Self { sector, offset }
    }

    /// Offset 0 of the same sector
    pub const fn sector_start(self) -> Self {
        Self::new(self.sector, 0)
    }

    /// Same sector, different offset
    pub const fn with_offset(self, offset: u32) -> Self {
        Self::new(self.sector, offset)
    }

    /// Move forward inside the sector; `None` on u32 overflow
    pub fn checked_add(self, bytes: u32) -> Option<Self> {
        self.offset
            .checked_add(bytes)
            .map(|offset| self.with_offset(offset))
    }

    /// Move backward inside the sector; `None` below offset 0
    pub fn checked_sub(self, bytes: u32) -> Option<Self> {
        self.offset
            .checked_sub(bytes)
            .map(|offset| self.with_offset(offset))
    }

    /// Pack into the `sector << 32 | offset` form
    pub const fn to_u64(self) -> u64 {
        ((self.sector as u64) << 32) | self.offset as u64
    }

    pub const fn from_u64(raw: u64) -> Self {
        Self::new((raw >> 32) as u32, raw as u32)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#06x}", self.sector, self.offset)
    }
}
