//! Flash Device Module
//!
//! The contract the store expects from the physical block device, plus two
//! implementations: an in-RAM device for tests and a file-backed image.
//!
//! ## Responsibilities
//! - Byte-addressed `read`, `program`, `erase` on a flat device
//! - Report program granularity, erase page size and erase value
//! - Report whether the device needs an explicit erase before re-programming
//!
//! Offsets passed to the device are absolute device offsets; the store
//! translates `(sector, offset)` addresses before calling in.

mod file;
mod mem;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileFlash;
pub use mem::MemFlash;

/// Largest supported program granularity (also the chunk size for moves)
pub const MAX_WRITE_BLOCK_SIZE: usize = 32;

/// Geometry and capability flags of a flash device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashParameters {
    /// Program granularity in bytes (power of two)
    pub write_block_size: usize,

    /// Erase granularity in bytes
    pub erase_page_size: usize,

    /// Byte value of erased cells
    pub erase_value: u8,

    /// Cells must be erased before they can be programmed again
    pub explicit_erase: bool,
}

impl FlashParameters {
    /// NOR-like flash: 4-byte programs, 4 KiB erase pages, erased to 0xFF
    pub const fn nor() -> Self {
        Self {
            write_block_size: 4,
            erase_page_size: 4096,
            erase_value: 0xFF,
            explicit_erase: true,
        }
    }

    /// Write-in-place memory (RRAM/MRAM style): no erase cycle needed
    pub const fn write_in_place() -> Self {
        Self {
            write_block_size: 16,
            erase_page_size: 16,
            erase_value: 0xFF,
            explicit_erase: false,
        }
    }
}

/// Errors reported by a flash device
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("Access out of bounds: offset {offset:#x}, length {len}")]
    OutOfBounds { offset: u64, len: usize },

    #[error("Misaligned access: offset {offset:#x}, length {len}")]
    Misaligned { offset: u64, len: usize },

    #[error("Device lost power")]
    PowerLoss,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait describing the block device underneath a store
pub trait Flash {
    /// Device geometry; expected to be cheap and constant
    fn parameters(&self) -> FlashParameters;

    /// Device size in bytes
    fn size(&self) -> u64;

    /// Read `buf.len()` bytes starting at `offset`
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Program `data` at `offset`. Offset and length are multiples of the
    /// write block size.
    fn program(&mut self, offset: u64, data: &[u8]) -> Result<(), FlashError>;

    /// Erase `len` bytes at `offset`. Both are multiples of the erase page
    /// size. Never called on devices without `explicit_erase`.
    fn erase(&mut self, offset: u64, len: usize) -> Result<(), FlashError>;
}

/// Shared bounds check for device implementations
pub(crate) fn check_bounds(size: u64, offset: u64, len: usize) -> Result<(), FlashError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(FlashError::OutOfBounds { offset, len }),
    }
}
