//! Per-sector generation counter

use std::fmt;

/// Rotating tag that ties a record to one occupancy of its sector.
///
/// Every record copies the generation of the sector it is written into. A
/// record only counts as written when its checksum holds *and* its
/// generation equals the one its sector header currently carries, which
/// rejects leftovers from earlier uses of the sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Generation(u8);

impl Generation {
    /// Generation assumed for a sector without a readable header
    pub const UNUSED: Generation = Generation(0);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The generation a sector gets when it is (re)opened, modulo 256
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn matches(self, expected: Generation) -> bool {
        self == expected
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}
