//! Configuration for sectorkv
//!
//! Centralized store configuration with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration for a sectorkv store instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Region Layout
    // -------------------------------------------------------------------------
    /// Size of one sector in bytes.
    /// Must be a multiple of the record slot size and, on devices that need
    /// explicit erase, of the device erase page.
    pub sector_size: u32,

    /// Number of sectors in the managed region (at least 2)
    pub sector_count: u32,

    /// Device byte offset of sector 0
    pub partition_offset: u64,

    // -------------------------------------------------------------------------
    // Lookup Cache
    // -------------------------------------------------------------------------
    /// Number of lookup cache buckets (0 disables the cache)
    pub lookup_cache_size: usize,

    // -------------------------------------------------------------------------
    // Write Behaviour
    // -------------------------------------------------------------------------
    /// What happens to the previous version of a key on overwrite
    pub history: HistoryPolicy,

    /// Compute and verify CRC-32 over out-of-record payloads
    pub data_crc: bool,
}

/// Superseded-version policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryPolicy {
    /// Older versions stay readable through `read_history` until GC drops them
    Keep,

    /// The previous record is overwritten in place once the new one is durable,
    /// so at most one version of a key is ever valid
    Invalidate,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sector_size: 4096,
            sector_count: 3,
            partition_offset: 0,
            lookup_cache_size: 128,
            history: HistoryPolicy::Keep,
            data_crc: true,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Total bytes of the managed region
    pub fn region_size(&self) -> u64 {
        u64::from(self.sector_size) * u64::from(self.sector_count)
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the sector size (in bytes)
    pub fn sector_size(mut self, size: u32) -> Self {
        self.config.sector_size = size;
        self
    }

    /// Set the number of sectors
    pub fn sector_count(mut self, count: u32) -> Self {
        self.config.sector_count = count;
        self
    }

    /// Set the device offset of the first sector
    pub fn partition_offset(mut self, offset: u64) -> Self {
        self.config.partition_offset = offset;
        self
    }

    /// Set the number of lookup cache buckets (0 disables it)
    pub fn lookup_cache_size(mut self, buckets: usize) -> Self {
        self.config.lookup_cache_size = buckets;
        self
    }

    /// Set the superseded-version policy
    pub fn history(mut self, policy: HistoryPolicy) -> Self {
        self.config.history = policy;
        self
    }

    /// Enable or disable payload CRC-32
    pub fn data_crc(mut self, enabled: bool) -> Self {
        self.config.data_crc = enabled;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
