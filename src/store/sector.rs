//! Sector header protocol and record walks
//!
//! ## Header Slots
//! ```text
//!   sector_size - 1·ate : EMPTY  (generation, magic, version)
//!   sector_size - 2·ate : CLOSE  (generation, offset of last record)
//!   sector_size - 3·ate : first record slot
//! ```
//! A sector is closed only when both markers are intact and carry the same
//! generation.
//!
//! ## Walk Order
//! Walks start at a record and move to older ones: up through the sector's
//! record slots, then into the previous sector at its CLOSE offset, until
//! the previous sector is not closed (the log's oldest end) which lands back
//! on the ATE write pointer.

use std::ops::ControlFlow;

use tracing::debug;

use crate::address::Address;
use crate::ate::{Ate, Generation};
use crate::error::{KvError, Result};
use crate::flash::Flash;

use super::StoreState;

impl<F: Flash> StoreState<F> {
    // =========================================================================
    // Headers
    // =========================================================================

    /// Generation carried by the sector's EMPTY marker, `UNUSED` without one
    pub(super) fn sector_generation(&self, sector: u32) -> Result<Generation> {
        let empty = self.read_ate(self.empty_slot(sector))?;
        Ok(if empty.is_empty_marker() {
            empty.generation()
        } else {
            Generation::UNUSED
        })
    }

    /// CLOSE offset of the sector if it is validly closed
    pub(super) fn closed_sector(&self, sector: u32) -> Result<Option<u32>> {
        let empty = self.read_ate(self.empty_slot(sector))?;
        let close = self.read_ate(self.close_slot(sector))?;
        let closed = empty.is_empty_marker()
            && close.is_close_marker(self.sector_size(), self.ate_size)
            && close.generation().matches(empty.generation());
        Ok(if closed { close.offset() } else { None })
    }

    /// Write an EMPTY marker with the next generation. Pointers are untouched.
    pub(super) fn add_empty_ate(&mut self, sector: u32) -> Result<()> {
        let generation = self.sector_generation(sector)?.next();
        self.write_ate_at(self.empty_slot(sector), &Ate::empty_marker(generation))?;
        debug!(sector, %generation, "Opened sector");
        Ok(())
    }

    /// Append a GC-done marker to the active sector
    pub(super) fn add_gc_done_ate(&mut self) -> Result<()> {
        self.write_ate(&Ate::gc_done_marker(self.sector_cycle))
    }

    // =========================================================================
    // Walks
    // =========================================================================

    /// Step from `addr` to the next older record slot
    pub(super) fn older(&self, addr: Address) -> Result<Address> {
        let next = addr.offset + self.ate_size;
        if next < self.close_slot(addr.sector).offset {
            return Ok(addr.with_offset(next));
        }

        let prev = self.prev_sector(addr.sector);
        Ok(match self.closed_sector(prev)? {
            Some(offset) => Address::new(prev, offset),
            None => self.ate_wra,
        })
    }

    /// Visit every valid record from `start` back to (excluding) `end`,
    /// newest first, until `visit` breaks
    pub(super) fn walk<V>(&self, start: Address, end: Address, mut visit: V) -> Result<()>
    where
        V: FnMut(Address, &Ate) -> Result<ControlFlow<()>>,
    {
        let mut addr = start;
        let mut current: Option<(u32, Generation)> = None;
        for _ in 0..self.walk_budget() {
            let generation = match current {
                Some((sector, generation)) if sector == addr.sector => generation,
                _ => {
                    let generation = self.sector_generation(addr.sector)?;
                    current = Some((addr.sector, generation));
                    generation
                }
            };

            let ate = self.read_ate(addr)?;
            if ate.is_valid(generation) && visit(addr, &ate)?.is_break() {
                return Ok(());
            }

            addr = self.older(addr)?;
            if addr == end {
                return Ok(());
            }
        }
        Err(KvError::DataCorrupt(format!(
            "record walk from {start} did not terminate"
        )))
    }

    /// Newest valid record for `key` between `start` and `end`
    pub(super) fn find_ate_with_id(
        &self,
        key: u32,
        start: Address,
        end: Address,
    ) -> Result<Option<(Address, Ate)>> {
        let mut found = None;
        self.walk(start, end, |addr, ate| {
            if ate.key() == key {
                found = Some((addr, *ate));
                return Ok(ControlFlow::Break(()));
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(found)
    }

    /// Every valid record in the log, newest first
    pub(super) fn for_each_record<V>(&self, mut visit: V) -> Result<()>
    where
        V: FnMut(Address, &Ate) -> Result<()>,
    {
        self.walk(self.ate_wra, self.ate_wra, |addr, ate| {
            visit(addr, ate)?;
            Ok(ControlFlow::Continue(()))
        })
    }
}
