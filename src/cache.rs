//! Lookup Cache Module
//!
//! Direct-mapped table from key hash to the address of the newest record
//! whose key lands in that bucket.
//!
//! ## Responsibilities
//! - Give reads and dedup a starting point for the backward record walk
//! - Answer "key never written" without touching flash
//! - Stay coherent through `observe_write`, `observe_erase` and `rebuild`
//!
//! A bucket may be shared by several keys; it always holds the newest
//! record among them, so walking backward from it still reaches the newest
//! record of any colliding key.

use crate::address::Address;

/// Outcome of looking up a key in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// Cache disabled: walk from the write pointer
    Bypass,

    /// No live record can exist for this key
    Absent,

    /// Walk from this address
    StartAt(Address),
}

/// Fixed-size key -> record address table
#[derive(Debug, Clone)]
pub struct LookupCache {
    buckets: Vec<Option<Address>>,
}

impl LookupCache {
    /// Create a cache with `buckets` entries (0 disables it)
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: vec![None; buckets],
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.buckets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Number of buckets currently pointing at a record
    pub fn occupied(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
    }

    pub fn lookup(&self, key: u32) -> CacheLookup {
        match self.bucket(key) {
            None => CacheLookup::Bypass,
            Some(idx) => match self.buckets[idx] {
                Some(addr) => CacheLookup::StartAt(addr),
                None => CacheLookup::Absent,
            },
        }
    }

    // =========================================================================
    // Coherency
    // =========================================================================

    /// A record for `key` was just written at `addr`
    pub fn observe_write(&mut self, key: u32, addr: Address) {
        if let Some(idx) = self.bucket(key) {
            self.buckets[idx] = Some(addr);
        }
    }

    /// `sector` was erased; forget every bucket pointing into it
    pub fn observe_erase(&mut self, sector: u32) {
        for bucket in &mut self.buckets {
            if matches!(bucket, Some(addr) if addr.sector == sector) {
                *bucket = None;
            }
        }
    }

    /// Refill from `(key, address)` pairs ordered newest first
    pub fn rebuild<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (u32, Address)>,
    {
        self.buckets.fill(None);
        for (key, addr) in records {
            if let Some(idx) = self.bucket(key) {
                self.buckets[idx].get_or_insert(addr);
            }
        }
    }

    fn bucket(&self, key: u32) -> Option<usize> {
        if self.buckets.is_empty() {
            return None;
        }
        Some(hash(key) as usize % self.buckets.len())
    }
}

/// 32-bit integer mixer (lowbias32)
fn hash(key: u32) -> u32 {
    let mut h = key;
    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb_352d);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846c_a68b);
    h ^= h >> 16;
    h
}
