//! Record encoding and validation

use super::crc8::crc8;
use super::generation::Generation;
use super::{
    ATE_SIZE, EMPTY_MARKER_LEN, FORMAT_VERSION, INLINE_DATA_SIZE, MAGIC, RESERVED_KEY,
};

/// The 8-byte payload union, selected by the record length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtePayload {
    /// Value bytes kept inside the record (length <= 8)
    Inline([u8; INLINE_DATA_SIZE]),

    /// Pointer into the sector's data region, or marker metadata
    OutOfRecord { offset: u32, meta: u32 },
}

/// One allocation record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ate {
    crc8: u8,
    generation: Generation,
    len: u16,
    key: u32,
    payload: AtePayload,
}

impl Ate {
    // =========================================================================
    // Constructors (always sealed)
    // =========================================================================

    /// Record holding a value of at most 8 bytes
    pub fn inline(key: u32, generation: Generation, value: &[u8]) -> Self {
        debug_assert!(value.len() <= INLINE_DATA_SIZE);
        let mut data = [0u8; INLINE_DATA_SIZE];
        data[..value.len()].copy_from_slice(value);
        Self::sealed(key, generation, value.len() as u16, AtePayload::Inline(data))
    }

    /// Record pointing at `len` bytes stored at `offset` in the same sector
    pub fn out_of_record(
        key: u32,
        generation: Generation,
        len: u16,
        offset: u32,
        data_crc: u32,
    ) -> Self {
        Self::sealed(
            key,
            generation,
            len,
            AtePayload::OutOfRecord {
                offset,
                meta: data_crc,
            },
        )
    }

    /// Deletion record (zero length)
    pub fn tombstone(key: u32, generation: Generation) -> Self {
        Self::inline(key, generation, &[])
    }

    /// EMPTY marker: written once when a sector is (re)opened
    pub fn empty_marker(generation: Generation) -> Self {
        let meta = (u32::from(MAGIC) << 8) | u32::from(FORMAT_VERSION);
        Self::sealed(
            RESERVED_KEY,
            generation,
            EMPTY_MARKER_LEN,
            AtePayload::OutOfRecord { offset: 0, meta },
        )
    }

    /// CLOSE marker: written once when a sector is retired
    pub fn close_marker(generation: Generation, last_record_offset: u32) -> Self {
        Self::sealed(
            RESERVED_KEY,
            generation,
            0,
            AtePayload::OutOfRecord {
                offset: last_record_offset,
                meta: u32::MAX,
            },
        )
    }

    /// GC-done marker: proves a collection pass into this sector completed
    pub fn gc_done_marker(generation: Generation) -> Self {
        Self::sealed(
            RESERVED_KEY,
            generation,
            0,
            AtePayload::OutOfRecord {
                offset: 0,
                meta: u32::MAX,
            },
        )
    }

    /// Same record re-homed into another sector
    pub fn relocated(&self, generation: Generation, data_offset: Option<u32>) -> Self {
        let payload = match (self.payload, data_offset) {
            (AtePayload::OutOfRecord { meta, .. }, Some(offset)) => {
                AtePayload::OutOfRecord { offset, meta }
            }
            (payload, _) => payload,
        };
        Self::sealed(self.key, generation, self.len, payload)
    }

    fn sealed(key: u32, generation: Generation, len: u16, payload: AtePayload) -> Self {
        let mut ate = Self {
            crc8: 0,
            generation,
            len,
            key,
            payload,
        };
        ate.crc8 = ate.compute_crc8();
        ate
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    pub fn to_bytes(&self) -> [u8; ATE_SIZE] {
        let mut bytes = [0u8; ATE_SIZE];
        bytes[0] = self.crc8;
        bytes[1] = self.generation.raw();
        bytes[2..4].copy_from_slice(&self.len.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.key.to_le_bytes());
        match self.payload {
            AtePayload::Inline(data) => bytes[8..16].copy_from_slice(&data),
            AtePayload::OutOfRecord { offset, meta } => {
                bytes[8..12].copy_from_slice(&offset.to_le_bytes());
                bytes[12..16].copy_from_slice(&meta.to_le_bytes());
            }
        }
        bytes
    }

    /// Decode raw slot content. Never fails: whether the bytes describe a
    /// real record is decided by [`Ate::is_valid`].
    pub fn from_bytes(bytes: &[u8; ATE_SIZE]) -> Self {
        let len = u16::from_le_bytes([bytes[2], bytes[3]]);
        let key = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let payload = if key == RESERVED_KEY || usize::from(len) > INLINE_DATA_SIZE {
            AtePayload::OutOfRecord {
                offset: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
                meta: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            }
        } else {
            let mut data = [0u8; INLINE_DATA_SIZE];
            data.copy_from_slice(&bytes[8..16]);
            AtePayload::Inline(data)
        };
        Self {
            crc8: bytes[0],
            generation: Generation::new(bytes[1]),
            len,
            key,
            payload,
        }
    }

    fn compute_crc8(&self) -> u8 {
        let bytes = self.to_bytes();
        crc8(&bytes[1..])
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checksum holds
    pub fn is_intact(&self) -> bool {
        self.crc8 == self.compute_crc8()
    }

    /// Checksum holds and the record belongs to the `expected` occupancy
    pub fn is_valid(&self, expected: Generation) -> bool {
        self.generation.matches(expected) && self.is_intact()
    }

    /// Intact EMPTY marker (its own generation is the sector's)
    pub fn is_empty_marker(&self) -> bool {
        self.key == RESERVED_KEY && self.len == EMPTY_MARKER_LEN && self.is_intact()
    }

    /// Intact CLOSE marker whose offset names a record slot of the sector
    pub fn is_close_marker(&self, sector_size: u32, slot_size: u32) -> bool {
        let AtePayload::OutOfRecord { offset, .. } = self.payload else {
            return false;
        };
        self.key == RESERVED_KEY
            && self.len == 0
            && offset < sector_size
            && (sector_size - offset) % slot_size == 0
            && self.is_intact()
    }

    /// GC-done marker valid for the `expected` generation
    pub fn is_gc_done_marker(&self, expected: Generation) -> bool {
        self.key == RESERVED_KEY && self.len == 0 && self.is_valid(expected)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn crc8(&self) -> u8 {
        self.crc8
    }

    pub fn payload(&self) -> AtePayload {
        self.payload
    }

    /// Zero-length user record
    pub fn is_deleted(&self) -> bool {
        self.len == 0
    }

    /// Record describes a sector lifecycle event rather than user data
    pub fn is_lifecycle(&self) -> bool {
        self.key == RESERVED_KEY
    }

    /// Value stored outside the record
    pub fn is_out_of_record(&self) -> bool {
        usize::from(self.len) > INLINE_DATA_SIZE
    }

    /// Inline value bytes (empty for out-of-record records)
    pub fn inline_data(&self) -> &[u8] {
        match &self.payload {
            AtePayload::Inline(data) => &data[..usize::from(self.len).min(INLINE_DATA_SIZE)],
            AtePayload::OutOfRecord { .. } => &[],
        }
    }

    /// Offset of the value (or, for CLOSE, of the last record)
    pub fn offset(&self) -> Option<u32> {
        match self.payload {
            AtePayload::OutOfRecord { offset, .. } => Some(offset),
            AtePayload::Inline(_) => None,
        }
    }

    /// CRC-32 of an out-of-record value
    pub fn data_crc(&self) -> Option<u32> {
        match self.payload {
            AtePayload::OutOfRecord { meta, .. } if self.is_out_of_record() => Some(meta),
            _ => None,
        }
    }

    /// Format magic of an EMPTY marker
    pub fn magic(&self) -> u8 {
        match self.payload {
            AtePayload::OutOfRecord { meta, .. } => (meta >> 8) as u8,
            AtePayload::Inline(_) => 0,
        }
    }

    /// Layout version of an EMPTY marker
    pub fn version(&self) -> u8 {
        match self.payload {
            AtePayload::OutOfRecord { meta, .. } => meta as u8,
            AtePayload::Inline(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_layout() {
        let ate = Ate::inline(0x0102_0304, Generation::new(3), b"AAAA");
        let bytes = ate.to_bytes();

        assert_eq!(bytes[1], 3);
        assert_eq!(&bytes[2..4], &4u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..16], b"AAAA\0\0\0\0");
        assert_eq!(bytes[0], crc8(&bytes[1..]));
    }

    #[test]
    fn test_out_of_record_layout() {
        let ate = Ate::out_of_record(9, Generation::new(1), 10, 0x40, 0xDEAD_BEEF);
        let bytes = ate.to_bytes();

        assert_eq!(&bytes[8..12], &0x40u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0xDEAD_BEEFu32.to_le_bytes());

        let decoded = Ate::from_bytes(&bytes);
        assert_eq!(decoded, ate);
        assert_eq!(decoded.offset(), Some(0x40));
        assert_eq!(decoded.data_crc(), Some(0xDEAD_BEEF));
        assert!(decoded.inline_data().is_empty());
    }

    #[test]
    fn test_validation_requires_generation() {
        let ate = Ate::inline(1, Generation::new(5), b"x");
        assert!(ate.is_valid(Generation::new(5)));
        assert!(!ate.is_valid(Generation::new(6)));
    }

    #[test]
    fn test_flipped_bit_invalidates() {
        let mut bytes = Ate::inline(1, Generation::new(5), b"xyz").to_bytes();
        bytes[9] ^= 0x10;
        assert!(!Ate::from_bytes(&bytes).is_valid(Generation::new(5)));
    }

    #[test]
    fn test_blank_slots_are_invalid() {
        for fill in [0x00u8, 0xFF] {
            let ate = Ate::from_bytes(&[fill; ATE_SIZE]);
            assert!(!ate.is_intact());
            assert!(!ate.is_empty_marker());
        }
    }

    #[test]
    fn test_empty_marker_fields() {
        let ate = Ate::from_bytes(&Ate::empty_marker(Generation::new(7)).to_bytes());
        assert!(ate.is_empty_marker());
        assert!(ate.is_lifecycle());
        assert_eq!(ate.magic(), MAGIC);
        assert_eq!(ate.version(), FORMAT_VERSION);
        assert_eq!(ate.generation(), Generation::new(7));
    }

    #[test]
    fn test_close_marker_offset_must_name_a_slot() {
        let good = Ate::close_marker(Generation::new(1), 4096 - 3 * 16);
        assert!(good.is_close_marker(4096, 16));

        let misaligned = Ate::close_marker(Generation::new(1), 4096 - 3 * 16 + 4);
        assert!(!misaligned.is_close_marker(4096, 16));

        let outside = Ate::close_marker(Generation::new(1), 8192);
        assert!(!outside.is_close_marker(4096, 16));
    }

    #[test]
    fn test_relocated_keeps_key_and_crc() {
        let ate = Ate::out_of_record(3, Generation::new(1), 20, 0, 0x1234);
        let moved = ate.relocated(Generation::new(2), Some(64));

        assert_eq!(moved.key(), 3);
        assert_eq!(moved.len(), 20);
        assert_eq!(moved.offset(), Some(64));
        assert_eq!(moved.data_crc(), Some(0x1234));
        assert!(moved.is_valid(Generation::new(2)));
    }

    #[test]
    fn test_tombstone() {
        let ate = Ate::tombstone(12, Generation::new(1));
        assert!(ate.is_deleted());
        assert!(ate.inline_data().is_empty());
        assert!(!ate.is_out_of_record());
    }
}
