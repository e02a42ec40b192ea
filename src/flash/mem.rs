//! In-RAM flash device
//!
//! Models the two device families the store targets and lets tests cut
//! power at an exact operation.

use super::{check_bounds, Flash, FlashError, FlashParameters};

/// RAM-backed flash with power-loss injection.
///
/// With `explicit_erase` set it behaves like NOR: programming can only
/// clear bits (`cell &= data`) and erase restores `erase_value`. Without it
/// programs overwrite in place.
#[derive(Debug, Clone)]
pub struct MemFlash {
    cells: Vec<u8>,
    params: FlashParameters,
    programs: u64,
    erases: u64,
    /// Device operations (program or erase) still allowed before power drops
    power_budget: Option<u64>,
    tear: bool,
    powered: bool,
}

impl MemFlash {
    /// Blank device of `size` bytes
    pub fn new(size: usize, params: FlashParameters) -> Self {
        Self {
            cells: vec![params.erase_value; size],
            params,
            programs: 0,
            erases: 0,
            power_budget: None,
            tear: false,
            powered: true,
        }
    }

    /// Blank NOR-like device
    pub fn nor(size: usize) -> Self {
        Self::new(size, FlashParameters::nor())
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Let `ops` more program/erase calls succeed, then fail everything
    pub fn cut_power_after(&mut self, ops: u64) {
        self.power_budget = Some(ops);
    }

    /// Make the program that hits the power cut land all but its last byte
    pub fn tear_writes(&mut self, tear: bool) {
        self.tear = tear;
    }

    /// Power back on; content stays as the cut left it
    pub fn restore_power(&mut self) {
        self.power_budget = None;
        self.powered = true;
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn program_count(&self) -> u64 {
        self.programs
    }

    pub fn erase_count(&self) -> u64 {
        self.erases
    }

    /// Raw cell content
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Raw cell content, for planting corruption
    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Consume one operation of the power budget.
    /// Returns false when this operation is the one that loses power.
    fn spend_power(&mut self) -> Result<bool, FlashError> {
        if !self.powered {
            return Err(FlashError::PowerLoss);
        }
        match self.power_budget {
            Some(0) => {
                self.powered = false;
                Ok(false)
            }
            Some(ref mut left) => {
                *left -= 1;
                Ok(true)
            }
            None => Ok(true),
        }
    }

    fn apply(&mut self, offset: usize, data: &[u8]) {
        let cells = &mut self.cells[offset..offset + data.len()];
        if self.params.explicit_erase {
            for (cell, byte) in cells.iter_mut().zip(data) {
                *cell &= *byte;
            }
        } else {
            cells.copy_from_slice(data);
        }
    }
}

impl Flash for MemFlash {
    fn parameters(&self) -> FlashParameters {
        self.params
    }

    fn size(&self) -> u64 {
        self.cells.len() as u64
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), FlashError> {
        check_bounds(self.size(), offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.cells[start..start + buf.len()]);
        Ok(())
    }

    fn program(&mut self, offset: u64, data: &[u8]) -> Result<(), FlashError> {
        check_bounds(self.size(), offset, data.len())?;
        let block = self.params.write_block_size as u64;
        if offset % block != 0 || data.len() as u64 % block != 0 {
            return Err(FlashError::Misaligned {
                offset,
                len: data.len(),
            });
        }

        if !self.spend_power()? {
            if self.tear && !data.is_empty() {
                self.apply(offset as usize, &data[..data.len() - 1]);
            }
            return Err(FlashError::PowerLoss);
        }

        self.apply(offset as usize, data);
        self.programs += 1;
        Ok(())
    }

    fn erase(&mut self, offset: u64, len: usize) -> Result<(), FlashError> {
        check_bounds(self.size(), offset, len)?;
        let page = self.params.erase_page_size as u64;
        if offset % page != 0 || len as u64 % page != 0 {
            return Err(FlashError::Misaligned { offset, len });
        }

        if !self.spend_power()? {
            return Err(FlashError::PowerLoss);
        }

        let start = offset as usize;
        self.cells[start..start + len].fill(self.params.erase_value);
        self.erases += 1;
        Ok(())
    }
}
