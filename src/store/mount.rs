//! Mount and recovery
//!
//! ## Recovery Steps
//! 1. Find the open sector that follows a closed one (the active sector)
//! 2. Scan its record slots to recover both write pointers
//! 3. Redo a sector close that lost power halfway
//! 4. If the next sector is still closed, finish or restart the GC pass
//! 5. Skip past bytes a torn write left behind
//! 6. Rebuild the lookup cache
//!
//! Interrupted closes, GC passes and half-written records are all ordinary
//! post-crash states and are repaired here without surfacing an error.

use tracing::{debug, info, warn};

use crate::address::Address;
use crate::ate::{Ate, ATE_SIZE, FORMAT_VERSION, MAGIC};
use crate::cache::LookupCache;
use crate::error::{KvError, Result};
use crate::flash::{Flash, MAX_WRITE_BLOCK_SIZE};

use super::StoreState;

impl<F: Flash> StoreState<F> {
    pub(super) fn mount(&mut self) -> Result<()> {
        self.ready = false;
        self.validate_geometry()?;

        // Lookups during recovery must walk from the write pointer
        self.cache = LookupCache::new(0);

        let active = self.locate_active_sector()?;
        self.recover_tail(active)?;
        if self.close_interrupted(active)? {
            warn!(sector = active, "Completing interrupted sector close");
            self.rotate()?;
        }
        self.finish_interrupted_work()?;

        self.cache = LookupCache::new(self.config.lookup_cache_size);
        self.rebuild_cache()?;

        self.ready = true;
        info!(
            sectors = self.sector_count(),
            sector_size = self.sector_size(),
            ate_wra = %self.ate_wra,
            data_wra = %self.data_wra,
            "Store mounted"
        );
        Ok(())
    }

    pub(super) fn clear(&mut self) -> Result<()> {
        self.ensure_ready()?;
        for sector in 0..self.sector_count() {
            self.erase_sector(sector)?;
            self.add_empty_ate(sector)?;
        }
        self.ready = false;
        self.cache = LookupCache::new(0);
        info!(sectors = self.sector_count(), "Store cleared");
        Ok(())
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    fn validate_geometry(&mut self) -> Result<()> {
        let params = self.flash.parameters();
        let block = params.write_block_size;
        if block == 0 || !block.is_power_of_two() || block > MAX_WRITE_BLOCK_SIZE {
            return Err(KvError::InvalidArgument(format!(
                "unsupported write block size {block}"
            )));
        }
        self.params = params;
        self.ate_size = ATE_SIZE.div_ceil(block) as u32 * block as u32;

        let size = self.config.sector_size;
        if params.explicit_erase {
            let page = params.erase_page_size as u64;
            if page == 0 || u64::from(size) % page != 0 || self.config.partition_offset % page != 0 {
                return Err(KvError::InvalidArgument(format!(
                    "sector size {size} does not line up with erase page {page}"
                )));
            }
        }
        if size < 5 * self.ate_size || size % self.ate_size != 0 {
            return Err(KvError::InvalidArgument(format!(
                "sector size {size} is not a multiple of {} of at least 5 slots",
                self.ate_size
            )));
        }
        if self.config.sector_count < 2 {
            return Err(KvError::InvalidArgument(
                "at least 2 sectors are required".to_string(),
            ));
        }
        let end = self.config.partition_offset + self.config.region_size();
        if end > self.flash.size() {
            return Err(KvError::InvalidArgument(format!(
                "region ends at {end:#x}, past the device end {:#x}",
                self.flash.size()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Step 1: Active Sector
    // =========================================================================

    fn locate_active_sector(&mut self) -> Result<u32> {
        let count = self.sector_count();
        let mut closed = 0;

        for sector in 0..count {
            if self.closed_sector(sector)?.is_none() {
                continue;
            }
            closed += 1;
            self.check_format(&self.read_ate(self.empty_slot(sector))?)?;

            let next = self.next_sector(sector);
            if self.closed_sector(next)?.is_none() {
                // Crash between close and GC on the first lap leaves it bare
                if !self.read_ate(self.empty_slot(next))?.is_empty_marker() {
                    self.erase_sector(next)?;
                    self.add_empty_ate(next)?;
                }
                return Ok(next);
            }
        }

        if closed == count {
            return Err(KvError::UnsupportedFormat);
        }

        // Nothing closed yet: sector 0, unless a two-sector ring already
        // rotated into the last sector
        let last = count - 1;
        let sector = if self.holds_records(last)? { last } else { 0 };

        let empty = self.read_ate(self.empty_slot(sector))?;
        if empty.is_empty_marker() {
            self.check_format(&empty)?;
        } else {
            // Everything below the EMPTY slot must be blank on erasable
            // flash; otherwise this is somebody else's data
            let below_header = self.empty_slot(sector).offset as usize;
            if self.params.explicit_erase
                && !self.flash_cmp_const(
                    Address::new(sector, 0),
                    below_header,
                    self.params.erase_value,
                )?
            {
                return Err(KvError::UnsupportedFormat);
            }
            self.erase_sector(sector)?;
            self.add_empty_ate(sector)?;
        }
        Ok(sector)
    }

    /// Any valid record in the sector's record area. Invalidation zeroes
    /// superseded records but never the newest one, so a sector that took
    /// writes keeps at least one.
    fn holds_records(&self, sector: u32) -> Result<bool> {
        if !self.read_ate(self.empty_slot(sector))?.is_empty_marker() {
            return Ok(false);
        }
        let cycle = self.sector_generation(sector)?;
        let mut slot = Some(self.first_slot(sector));
        while let Some(addr) = slot {
            if self.read_ate(addr)?.is_valid(cycle) {
                return Ok(true);
            }
            slot = addr.checked_sub(self.ate_size);
        }
        Ok(false)
    }

    fn check_format(&self, empty: &Ate) -> Result<()> {
        if empty.magic() != MAGIC {
            return Err(KvError::UnsupportedFormat);
        }
        if empty.version() != FORMAT_VERSION {
            return Err(KvError::VersionMismatch {
                found: empty.version(),
                expected: FORMAT_VERSION,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Step 2: Write Pointers
    // =========================================================================

    /// Scan the active sector's record slots top-down. Invalid slots in the
    /// middle (zeroed stale records) do not end the scan; the lowest valid
    /// slot does.
    fn recover_tail(&mut self, sector: u32) -> Result<()> {
        self.sector_cycle = self.sector_generation(sector)?;
        let top = self.first_slot(sector);

        let mut data_end = 0u32;
        let mut lowest_valid = None;
        let mut slot = top;
        while slot.offset >= data_end {
            let ate = self.read_ate(slot)?;
            if ate.is_valid(self.sector_cycle) {
                lowest_valid = Some(slot);
                if !ate.is_lifecycle() && ate.is_out_of_record() {
                    if let Some(offset) = ate.offset() {
                        let end = offset.saturating_add(self.aligned(usize::from(ate.len())));
                        data_end = data_end.max(end);
                    }
                }
            }
            match slot.checked_sub(self.ate_size) {
                Some(lower) => slot = lower,
                None => break,
            }
        }

        self.ate_wra = match lowest_valid {
            Some(addr) => addr.checked_sub(self.ate_size).ok_or_else(|| {
                KvError::DataCorrupt(format!("record found in reserved slot {addr}"))
            })?,
            None => top,
        };
        // A deletion may take the last slot above the data, leaving the ATE
        // pointer below the data end; the next write then rotates
        self.data_wra = Address::new(sector, data_end);

        // A torn record leaves a dirty slot that cannot be programmed again
        if self.params.explicit_erase {
            while !self.flash_cmp_const(
                self.ate_wra,
                self.ate_size as usize,
                self.params.erase_value,
            )? {
                match self.ate_wra.checked_sub(self.ate_size) {
                    Some(lower) if lower.offset >= self.data_wra.offset => {
                        warn!(slot = %self.ate_wra, "Skipping damaged record slot");
                        self.ate_wra = lower;
                    }
                    _ => break,
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Steps 3-5: Interrupted Work
    // =========================================================================

    /// A CLOSE slot that is neither blank nor a valid marker on erasable
    /// flash: the close has to be programmed again with the same content
    fn close_interrupted(&self, sector: u32) -> Result<bool> {
        if !self.params.explicit_erase {
            return Ok(false);
        }
        let blank = self.flash_cmp_const(
            self.close_slot(sector),
            self.ate_size as usize,
            self.params.erase_value,
        )?;
        Ok(!blank)
    }

    fn finish_interrupted_work(&mut self) -> Result<()> {
        let sector = self.ate_wra.sector;
        let top = self.first_slot(sector);
        let next = self.next_sector(sector);

        if self.closed_sector(next)?.is_some() {
            if self.has_gc_done_marker()? {
                debug!(sector = next, "GC done marker found");
                self.erase_sector(next)?;
                self.add_empty_ate(next)?;
            } else {
                info!(sector, victim = next, "No GC done marker, restarting garbage collection");
                self.erase_sector(sector)?;
                self.add_empty_ate(sector)?;
                self.ate_wra = top;
                self.data_wra = Address::new(sector, 0);
                self.sector_cycle = self.sector_generation(sector)?;
                self.gc()?;
            }
        } else if self.params.explicit_erase {
            // Data programmed before its record made it to flash
            let gap = self.ate_wra.offset.saturating_sub(self.data_wra.offset) as usize;
            let erase_value = self.params.erase_value;
            if let Some(last) = self.last_byte_not(self.data_wra, gap, erase_value)? {
                let end = self.aligned(last as usize + 1).min(self.ate_wra.offset);
                warn!(from = %self.data_wra, to = end, "Skipping orphaned data");
                self.data_wra.offset = end;
            }

            if self.ate_wra == top && self.data_wra.offset != 0 {
                warn!(sector, "Erasing sector holding only orphaned data");
                self.erase_sector(sector)?;
                self.add_empty_ate(sector)?;
                self.data_wra = Address::new(sector, 0);
                self.sector_cycle = self.sector_generation(sector)?;
            }
        }

        // Keeps the check above cheap on the next mount
        if self.ate_wra == top {
            self.add_gc_done_ate()?;
        }
        Ok(())
    }

    fn has_gc_done_marker(&self) -> Result<bool> {
        let top = self.first_slot(self.ate_wra.sector);
        let mut slot = self.ate_wra.offset + self.ate_size;
        while slot <= top.offset {
            let ate = self.read_ate(top.with_offset(slot))?;
            if ate.is_gc_done_marker(self.sector_cycle) {
                return Ok(true);
            }
            slot += self.ate_size;
        }
        Ok(false)
    }

    // =========================================================================
    // Step 6: Cache
    // =========================================================================

    fn rebuild_cache(&mut self) -> Result<()> {
        if !self.cache.is_enabled() {
            return Ok(());
        }

        let mut records = Vec::new();
        self.for_each_record(|addr, ate| {
            if !ate.is_lifecycle() {
                records.push((ate.key(), addr));
            }
            Ok(())
        })?;
        self.cache.rebuild(records);

        debug!(
            buckets = self.cache.capacity(),
            occupied = self.cache.occupied(),
            "Rebuilt lookup cache"
        );
        Ok(())
    }
}
