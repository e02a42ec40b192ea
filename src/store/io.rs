//! Block I/O adapter
//!
//! Translates `(sector, offset)` addresses into device calls, pads programs
//! to the write block, and works in bounded chunks so no operation needs a
//! buffer larger than [`MAX_WRITE_BLOCK_SIZE`].

use tracing::debug;

use crate::address::Address;
use crate::ate::{Ate, ATE_SIZE};
use crate::error::{KvError, Result};
use crate::flash::{Flash, MAX_WRITE_BLOCK_SIZE};

use super::StoreState;

impl<F: Flash> StoreState<F> {
    fn device_offset(&self, addr: Address) -> u64 {
        self.config.partition_offset
            + u64::from(addr.sector) * u64::from(self.sector_size())
            + u64::from(addr.offset)
    }

    // =========================================================================
    // Raw Access
    // =========================================================================

    pub(super) fn flash_read(&self, addr: Address, buf: &mut [u8]) -> Result<()> {
        self.flash.read(self.device_offset(addr), buf)?;
        Ok(())
    }

    /// Program `data` at `addr`, padding the final partial block with the
    /// erase value
    pub(super) fn flash_write(&mut self, addr: Address, data: &[u8]) -> Result<()> {
        let block = self.params.write_block_size;
        let body = data.len() / block * block;
        let offset = self.device_offset(addr);

        if body > 0 {
            self.flash.program(offset, &data[..body])?;
        }

        let tail = &data[body..];
        if !tail.is_empty() {
            let mut padded = [self.params.erase_value; MAX_WRITE_BLOCK_SIZE];
            padded[..tail.len()].copy_from_slice(tail);
            self.flash.program(offset + body as u64, &padded[..block])?;
        }
        Ok(())
    }

    /// Compare flash content at `addr` with `data`
    pub(super) fn flash_cmp(&self, addr: Address, data: &[u8]) -> Result<bool> {
        let mut chunk = [0u8; MAX_WRITE_BLOCK_SIZE];
        let mut cursor = addr;
        for expected in data.chunks(MAX_WRITE_BLOCK_SIZE) {
            let buf = &mut chunk[..expected.len()];
            self.flash_read(cursor, buf)?;
            if &buf[..] != expected {
                return Ok(false);
            }
            cursor.offset += expected.len() as u32;
        }
        Ok(true)
    }

    /// True when all `len` bytes at `addr` equal `value`
    pub(super) fn flash_cmp_const(&self, addr: Address, len: usize, value: u8) -> Result<bool> {
        Ok(self.last_byte_not(addr, len, value)?.is_none())
    }

    /// Offset of the last byte in `addr..addr+len` that differs from `value`
    pub(super) fn last_byte_not(&self, addr: Address, len: usize, value: u8) -> Result<Option<u32>> {
        let mut chunk = [0u8; MAX_WRITE_BLOCK_SIZE];
        let mut last = None;
        let mut done = 0;
        while done < len {
            let n = (len - done).min(MAX_WRITE_BLOCK_SIZE);
            let start = addr.offset + done as u32;
            self.flash_read(addr.with_offset(start), &mut chunk[..n])?;
            if let Some(pos) = chunk[..n].iter().rposition(|&b| b != value) {
                last = Some(start + pos as u32);
            }
            done += n;
        }
        Ok(last)
    }

    // =========================================================================
    // Data Region
    // =========================================================================

    /// Append `data` at the data write pointer
    pub(super) fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.flash_write(self.data_wra, data)?;
        self.data_wra.offset += self.aligned(data.len());
        Ok(())
    }

    /// Copy `len` bytes from `src` to the data write pointer
    pub(super) fn move_block(&mut self, src: Address, len: usize) -> Result<()> {
        let mut chunk = [0u8; MAX_WRITE_BLOCK_SIZE];
        let mut done = 0;
        while done < len {
            let n = (len - done).min(MAX_WRITE_BLOCK_SIZE);
            self.flash_read(src.with_offset(src.offset + done as u32), &mut chunk[..n])?;
            self.write_data(&chunk[..n])?;
            done += n;
        }
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub(super) fn read_ate(&self, addr: Address) -> Result<Ate> {
        let mut bytes = [0u8; ATE_SIZE];
        self.flash_read(addr, &mut bytes)?;
        Ok(Ate::from_bytes(&bytes))
    }

    /// Program a record at an explicit slot, leaving the pointers alone
    pub(super) fn write_ate_at(&mut self, addr: Address, ate: &Ate) -> Result<()> {
        self.flash_write(addr, &ate.to_bytes())
    }

    /// Program a record at the ATE write pointer and move it down one slot
    pub(super) fn write_ate(&mut self, ate: &Ate) -> Result<()> {
        let addr = self.ate_wra;
        let next = addr.checked_sub(self.ate_size).ok_or_else(|| {
            KvError::DataCorrupt(format!("record pointer underflow at {addr}"))
        })?;

        self.write_ate_at(addr, ate)?;
        if !ate.is_lifecycle() {
            self.cache.observe_write(ate.key(), addr);
        }
        self.ate_wra = next;
        Ok(())
    }

    /// Overwrite a record slot with zeros so it never validates again
    pub(super) fn invalidate_ate(&mut self, addr: Address) -> Result<()> {
        let zeros = [0u8; MAX_WRITE_BLOCK_SIZE];
        self.flash_write(addr, &zeros[..self.ate_size as usize])
    }

    // =========================================================================
    // Erase
    // =========================================================================

    /// Erase `sector` (skipped on devices without explicit erase) and drop
    /// every cache entry pointing into it
    pub(super) fn erase_sector(&mut self, sector: u32) -> Result<()> {
        self.cache.observe_erase(sector);
        if !self.params.explicit_erase {
            return Ok(());
        }

        let offset = self.device_offset(Address::new(sector, 0));
        self.flash.erase(offset, self.sector_size() as usize)?;
        debug!(sector, "Erased sector");
        Ok(())
    }
}
