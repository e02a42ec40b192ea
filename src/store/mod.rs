//! Store Module
//!
//! The log-structured key/value engine running on top of a [`Flash`] device.
//!
//! ## Responsibilities
//! - Append-only writes with deduplication against the latest version
//! - Backward-scanning reads and history reads
//! - Sector rotation and garbage collection of the oldest sector
//! - Crash recovery at mount time
//!
//! ## Sector Ring
//! ```text
//!            ┌──────────┐   ┌──────────┐   ┌──────────┐
//!   ... ──▶  │  closed  │──▶│  active  │──▶│  victim  │ ──▶ ... (wraps)
//!            │ (oldest  │   │ (ATE and │   │ (next to │
//!            │  ...newer)   │ data wra)│   │  collect)│
//!            └──────────┘   └──────────┘   └──────────┘
//! ```
//! Records are written into the active sector. When it is full the sector is
//! closed, the next one becomes active, and the sector after that (the
//! oldest) has its live records copied forward before it is erased.

mod gc;
mod io;
mod mount;
mod ops;
mod sector;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::address::Address;
use crate::ate::{Generation, ATE_SIZE};
use crate::cache::LookupCache;
use crate::config::StoreConfig;
use crate::error::{KvError, Result};
use crate::flash::{Flash, FlashParameters};

/// A mounted key/value store
///
/// ## Concurrency:
/// - All mutations (write, delete, rotation, clear, remount) hold the write
///   guard, so at most one is in flight
/// - Reads hold a read guard and run concurrently with each other
/// - All methods use `&self`
pub struct Store<F: Flash> {
    state: RwLock<StoreState<F>>,
}

impl<F: Flash> Store<F> {
    /// Mount a store on `flash`
    ///
    /// On startup:
    /// 1. Validate the region geometry against the device
    /// 2. Locate the active sector
    /// 3. Recover the write pointers, finish interrupted GC
    /// 4. Rebuild the lookup cache
    pub fn mount(flash: F, config: StoreConfig) -> Result<Self> {
        let mut state = StoreState::new(flash, config);
        state.mount()?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Run recovery again on the same device (required after [`Store::clear`])
    pub fn remount(&self) -> Result<()> {
        self.state.write().mount()
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Store `data` under `key`.
    ///
    /// Returns the number of bytes written, or `Ok(0)` when the latest
    /// version already holds the same bytes and nothing was written.
    pub fn write(&self, key: u32, data: &[u8]) -> Result<usize> {
        self.state.write().write(key, data)
    }

    /// Delete `key`. Deleting an absent key is a no-op.
    pub fn delete(&self, key: u32) -> Result<()> {
        self.state.write().write(key, &[]).map(|_| ())
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Copy the latest value of `key` into `buf`; returns bytes copied
    pub fn read(&self, key: u32, buf: &mut [u8]) -> Result<usize> {
        self.state.read().read_history(key, buf, 0)
    }

    /// Like [`Store::read`], but skips `version_back` newer versions first
    pub fn read_history(&self, key: u32, buf: &mut [u8], version_back: u32) -> Result<usize> {
        self.state.read().read_history(key, buf, version_back)
    }

    /// Owned copy of the latest value of `key`
    pub fn read_value(&self, key: u32) -> Result<Bytes> {
        self.state.read().read_value(key)
    }

    /// Stored length of the latest value of `key`
    pub fn value_len(&self, key: u32) -> Result<usize> {
        self.state.read().value_len(key)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Bytes still available for new data across the whole region
    pub fn calc_free_space(&self) -> Result<usize> {
        self.state.read().calc_free_space()
    }

    /// Bytes still writable in the active sector before a rotation
    pub fn active_sector_free_space(&self) -> Result<usize> {
        self.state.read().active_sector_free_space()
    }

    /// Close the active sector and collect the next one
    pub fn force_sector_rotation(&self) -> Result<()> {
        self.state.write().force_sector_rotation()
    }

    /// Wipe every sector. The store is not ready again until
    /// [`Store::remount`] is called.
    pub fn clear(&self) -> Result<()> {
        self.state.write().clear()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().ready
    }

    pub fn config(&self) -> StoreConfig {
        self.state.read().config.clone()
    }

    /// Hand the device back
    pub fn into_device(self) -> F {
        self.state.into_inner().flash
    }
}

// =============================================================================
// Engine State
// =============================================================================

/// Everything the engine mutates, guarded by the store lock
pub(crate) struct StoreState<F> {
    flash: F,
    config: StoreConfig,
    params: FlashParameters,

    /// Record slot size: the encoded record rounded up to the write block
    ate_size: u32,

    /// Next record slot to program (grows downward)
    ate_wra: Address,

    /// Next data byte to program (grows upward)
    data_wra: Address,

    /// Generation of the active sector
    sector_cycle: Generation,

    cache: LookupCache,
    ready: bool,
}

impl<F: Flash> StoreState<F> {
    fn new(flash: F, config: StoreConfig) -> Self {
        let params = flash.parameters();
        Self {
            flash,
            params,
            ate_size: ATE_SIZE as u32,
            ate_wra: Address::new(0, 0),
            data_wra: Address::new(0, 0),
            sector_cycle: Generation::UNUSED,
            cache: LookupCache::new(0),
            ready: false,
            config,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(KvError::NotReady)
        }
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    fn sector_size(&self) -> u32 {
        self.config.sector_size
    }

    fn sector_count(&self) -> u32 {
        self.config.sector_count
    }

    fn next_sector(&self, sector: u32) -> u32 {
        (sector + 1) % self.sector_count()
    }

    fn prev_sector(&self, sector: u32) -> u32 {
        (sector + self.sector_count() - 1) % self.sector_count()
    }

    /// Slot of the EMPTY marker
    fn empty_slot(&self, sector: u32) -> Address {
        Address::new(sector, self.sector_size() - self.ate_size)
    }

    /// Slot of the CLOSE marker
    fn close_slot(&self, sector: u32) -> Address {
        Address::new(sector, self.sector_size() - 2 * self.ate_size)
    }

    /// First slot a record is written to after the sector opens
    fn first_slot(&self, sector: u32) -> Address {
        Address::new(sector, self.sector_size() - 3 * self.ate_size)
    }

    /// `len` rounded up to the device write block
    fn aligned(&self, len: usize) -> u32 {
        let block = self.params.write_block_size;
        (len.div_ceil(block) * block) as u32
    }

    /// Largest value a single write accepts
    fn max_value_size(&self) -> usize {
        let bound = self.sector_size().saturating_sub(5 * self.ate_size) as usize;
        bound.min(usize::from(u16::MAX))
    }

    /// Upper bound on record slots a full walk can visit
    fn walk_budget(&self) -> usize {
        (self.sector_count() as usize) * (self.sector_size() / self.ate_size) as usize + 1
    }
}
