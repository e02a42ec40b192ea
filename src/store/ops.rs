//! Write/read engine and free-space accounting

use std::collections::HashSet;

use bytes::Bytes;
use tracing::error;

use crate::address::Address;
use crate::ate::{Ate, INLINE_DATA_SIZE, RESERVED_KEY};
use crate::cache::CacheLookup;
use crate::config::HistoryPolicy;
use crate::error::{KvError, Result};
use crate::flash::Flash;

use super::StoreState;

impl<F: Flash> StoreState<F> {
    // =========================================================================
    // Write
    // =========================================================================

    pub(super) fn write(&mut self, key: u32, data: &[u8]) -> Result<usize> {
        self.ensure_ready()?;
        if key == RESERVED_KEY {
            return Err(KvError::InvalidArgument(format!(
                "key {key:#x} is reserved"
            )));
        }
        if data.len() > self.max_value_size() {
            return Err(KvError::InvalidArgument(format!(
                "value of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_value_size()
            )));
        }

        // Nothing to do if the latest version already holds these bytes
        match self.latest(key)? {
            Some((addr, ate)) => {
                if usize::from(ate.len()) == data.len() && self.payload_equals(addr, &ate, data)? {
                    return Ok(0);
                }
            }
            None if data.is_empty() => return Ok(0),
            None => {}
        }

        let required = if data.is_empty() {
            0
        } else if data.len() <= INLINE_DATA_SIZE {
            self.ate_size
        } else {
            self.aligned(data.len()) + self.ate_size
        };

        let mut gc_count = 0;
        while !self.has_room(required, data.is_empty()) {
            if gc_count == self.sector_count() {
                return Err(KvError::NoSpace);
            }
            self.rotate().inspect_err(|e| {
                error!(error = %e, "Sector rotation failed during write");
            })?;
            gc_count += 1;
        }

        // Looked up after rotation: GC may have moved the old record
        let stale = match self.config.history {
            HistoryPolicy::Invalidate => self.latest(key)?.map(|(addr, _)| addr),
            HistoryPolicy::Keep => None,
        };

        self.write_entry(key, data)?;

        if let Some(addr) = stale {
            self.invalidate_ate(addr)?;
        }
        Ok(data.len())
    }

    /// Slot 0 of a sector never holds a record, and the slot above it only
    /// takes a deletion, so the ATE pointer can always move down one slot.
    fn has_room(&self, required: u32, is_delete: bool) -> bool {
        let ate_offset = self.ate_wra.offset;
        ate_offset != 0
            && ate_offset >= self.data_wra.offset + required
            && (ate_offset - self.ate_size != 0 || is_delete)
    }

    fn write_entry(&mut self, key: u32, data: &[u8]) -> Result<()> {
        let generation = self.sector_cycle;
        let ate = if data.len() <= INLINE_DATA_SIZE {
            Ate::inline(key, generation, data)
        } else {
            let data_crc = if self.config.data_crc {
                crc32fast::hash(data)
            } else {
                0
            };
            let offset = self.data_wra.offset;
            self.write_data(data)?;
            Ate::out_of_record(key, generation, data.len() as u16, offset, data_crc)
        };
        self.write_ate(&ate)
    }

    fn payload_equals(&self, addr: Address, ate: &Ate, data: &[u8]) -> Result<bool> {
        if !ate.is_out_of_record() {
            return Ok(ate.inline_data() == data);
        }
        match self.value_address(addr, ate) {
            Some(value) => self.flash_cmp(value, data),
            None => Ok(false),
        }
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub(super) fn read_history(&self, key: u32, buf: &mut [u8], version_back: u32) -> Result<usize> {
        let (addr, ate) = self.find_version(key, version_back)?;
        self.copy_value(addr, &ate, buf)
    }

    pub(super) fn read_value(&self, key: u32) -> Result<Bytes> {
        let (addr, ate) = self.find_version(key, 0)?;
        let mut value = vec![0u8; usize::from(ate.len())];
        self.copy_value(addr, &ate, &mut value)?;
        Ok(Bytes::from(value))
    }

    pub(super) fn value_len(&self, key: u32) -> Result<usize> {
        let (_, ate) = self.find_version(key, 0)?;
        Ok(usize::from(ate.len()))
    }

    /// Where to begin the backward walk for `key`; `None` when the cache
    /// proves the key was never written
    fn walk_start(&self, key: u32) -> Option<Address> {
        match self.cache.lookup(key) {
            CacheLookup::Bypass => Some(self.ate_wra),
            CacheLookup::Absent => None,
            CacheLookup::StartAt(addr) => Some(addr),
        }
    }

    /// Newest valid record of `key`, deletions included
    fn latest(&self, key: u32) -> Result<Option<(Address, Ate)>> {
        match self.walk_start(key) {
            Some(start) => self.find_ate_with_id(key, start, self.ate_wra),
            None => Ok(None),
        }
    }

    /// Record `version_back` versions before the newest one
    fn find_version(&self, key: u32, version_back: u32) -> Result<(Address, Ate)> {
        self.ensure_ready()?;
        if key == RESERVED_KEY {
            return Err(KvError::InvalidArgument(format!(
                "key {key:#x} is reserved"
            )));
        }

        let mut start = self.walk_start(key).ok_or(KvError::NotFound)?;
        let mut remaining = version_back;
        loop {
            let (addr, ate) = self
                .find_ate_with_id(key, start, self.ate_wra)?
                .ok_or(KvError::NotFound)?;
            if remaining == 0 {
                if ate.is_deleted() {
                    return Err(KvError::NotFound);
                }
                return Ok((addr, ate));
            }

            remaining -= 1;
            start = self.older(addr)?;
            if start == self.ate_wra {
                return Err(KvError::NotFound);
            }
        }
    }

    /// Location of an out-of-record value, if it lies inside its sector
    fn value_address(&self, addr: Address, ate: &Ate) -> Option<Address> {
        let offset = ate.offset()?;
        let end = u64::from(offset) + u64::from(ate.len());
        (end <= u64::from(self.sector_size())).then(|| addr.with_offset(offset))
    }

    fn copy_value(&self, addr: Address, ate: &Ate, buf: &mut [u8]) -> Result<usize> {
        let len = usize::from(ate.len());
        let n = buf.len().min(len);

        if !ate.is_out_of_record() {
            buf[..n].copy_from_slice(&ate.inline_data()[..n]);
            return Ok(n);
        }

        let value = self.value_address(addr, ate).ok_or_else(|| {
            KvError::DataCorrupt(format!("value of record at {addr} lies outside its sector"))
        })?;
        self.flash_read(value, &mut buf[..n])?;

        // Partial reads cannot be checked
        if self.config.data_crc && n == len {
            let computed = crc32fast::hash(&buf[..n]);
            if ate.data_crc() != Some(computed) {
                error!(key = ate.key(), record = %addr, "Data CRC mismatch");
                return Err(KvError::DataCorrupt(format!(
                    "data CRC mismatch for key {:#x}",
                    ate.key()
                )));
            }
        }
        Ok(n)
    }

    // =========================================================================
    // Free Space
    // =========================================================================

    /// Region capacity minus the latest version of every live key.
    ///
    /// Each sector permanently spends four slots (EMPTY, CLOSE, GC-done and
    /// the reserved deletion slot) and one sector is always kept free for GC.
    pub(super) fn calc_free_space(&self) -> Result<usize> {
        self.ensure_ready()?;
        let ate = self.ate_size as usize;
        let per_sector = (self.sector_size() as usize).saturating_sub(4 * ate);
        let mut free = (self.sector_count() as usize - 1) * per_sector;

        let mut seen = HashSet::new();
        let mut used = 0usize;
        self.for_each_record(|_, record| {
            if record.is_lifecycle() || !seen.insert(record.key()) {
                return Ok(());
            }
            if !record.is_deleted() {
                used += ate;
                if record.is_out_of_record() {
                    used += self.aligned(usize::from(record.len())) as usize;
                }
            }
            Ok(())
        })?;
        free = free.saturating_sub(used);

        // A sector filled down to its last slots cannot lend the reserved
        // deletion slot back
        for sector in 0..self.sector_count() {
            let tail = match self.closed_sector(sector)? {
                Some(offset) => Some(offset),
                None if sector == self.ate_wra.sector => Some(self.ate_wra.offset + self.ate_size),
                None => None,
            };
            if matches!(tail, Some(offset) if offset <= 2 * self.ate_size) {
                free = free.saturating_sub(ate);
            }
        }
        Ok(free)
    }

    pub(super) fn active_sector_free_space(&self) -> Result<usize> {
        self.ensure_ready()?;
        let gap = self.ate_wra.offset.saturating_sub(self.data_wra.offset);
        Ok(gap.saturating_sub(self.ate_size) as usize)
    }
}
