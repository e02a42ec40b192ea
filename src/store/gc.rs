//! Sector rotation and garbage collection
//!
//! ## Rotation
//! ```text
//!   close(active) ──▶ active = next ──▶ gc(victim = next of active)
//! ```
//! GC copies every record of the victim that is still the newest version of
//! its key into the active sector, writes a GC-done marker, then erases and
//! reopens the victim. Copying is idempotent, so an interrupted pass is
//! simply restarted by mount.

use tracing::{debug, trace};

use crate::address::Address;
use crate::ate::{Ate, Generation};
use crate::cache::CacheLookup;
use crate::error::{KvError, Result};
use crate::flash::{Flash, MAX_WRITE_BLOCK_SIZE};

use super::StoreState;

impl<F: Flash> StoreState<F> {
    pub(super) fn force_sector_rotation(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.rotate()
    }

    pub(super) fn rotate(&mut self) -> Result<()> {
        self.sector_close()?;
        self.gc()
    }

    /// Retire the active sector and advance to the next one
    pub(super) fn sector_close(&mut self) -> Result<()> {
        let sector = self.ate_wra.sector;
        let last_record = self.ate_wra.offset + self.ate_size;

        // Stale slots of an earlier occupancy could validate again once the
        // generation wraps; erased devices start clean anyway
        if !self.params.explicit_erase {
            let poison = [self.params.erase_value; MAX_WRITE_BLOCK_SIZE];
            let mut slot = self.ate_wra;
            while slot.offset >= self.data_wra.offset {
                self.flash_write(slot, &poison[..self.ate_size as usize])?;
                match slot.checked_sub(self.ate_size) {
                    Some(lower) => slot = lower,
                    None => break,
                }
            }
        }

        let close = Ate::close_marker(self.sector_cycle, last_record);
        self.write_ate_at(self.close_slot(sector), &close)?;

        let next = self.next_sector(sector);
        self.sector_cycle = self.sector_generation(next)?;
        self.ate_wra = self.first_slot(next);
        self.data_wra = Address::new(next, 0);

        debug!(sector, next, "Closed sector");
        Ok(())
    }

    /// Collect the sector after the active one
    pub(super) fn gc(&mut self) -> Result<()> {
        let active = self.ate_wra.sector;
        if !self.read_ate(self.empty_slot(active))?.is_empty_marker() {
            self.erase_sector(active)?;
            self.add_empty_ate(active)?;
            self.sector_cycle = self.sector_generation(active)?;
        }
        let target_cycle = self.sector_cycle;

        let victim = self.next_sector(active);
        let mut moved = 0usize;
        if let Some(close_offset) = self.closed_sector(victim)? {
            let victim_cycle = self.sector_generation(victim)?;
            debug!(victim, "Collecting sector");

            let top = self.first_slot(victim).offset;
            let mut offset = close_offset;
            while offset <= top {
                let from = Address::new(victim, offset);
                let ate = self.read_ate(from)?;
                if ate.is_valid(victim_cycle) && !ate.is_lifecycle() && !ate.is_deleted() {
                    let start = match self.cache.lookup(ate.key()) {
                        CacheLookup::StartAt(addr) => addr,
                        CacheLookup::Bypass | CacheLookup::Absent => self.ate_wra,
                    };
                    let newest = self.find_ate_with_id(ate.key(), start, self.ate_wra)?;
                    if newest.map_or(true, |(addr, _)| addr == from) {
                        self.relocate(from, &ate, target_cycle)?;
                        moved += 1;
                    }
                }
                offset += self.ate_size;
            }
        }

        if self.ate_wra.offset >= self.data_wra.offset + self.ate_size {
            self.add_gc_done_ate()?;
        }
        self.erase_sector(victim)?;
        self.add_empty_ate(victim)?;

        debug!(victim, moved, "Garbage collection finished");
        Ok(())
    }

    /// Copy a live record (and its value) into the active sector
    fn relocate(&mut self, from: Address, ate: &Ate, target_cycle: Generation) -> Result<()> {
        let data_offset = if ate.is_out_of_record() {
            let src = ate
                .offset()
                .filter(|offset| {
                    u64::from(*offset) + u64::from(ate.len()) <= u64::from(self.sector_size())
                })
                .ok_or_else(|| {
                    KvError::DataCorrupt(format!("value of record at {from} lies outside its sector"))
                })?;
            let dest = self.data_wra.offset;
            self.move_block(from.with_offset(src), usize::from(ate.len()))?;
            Some(dest)
        } else {
            None
        };

        trace!(key = ate.key(), %from, to = %self.ate_wra, "Relocated record");
        self.write_ate(&ate.relocated(target_cycle, data_offset))
    }
}
