//! # sectorkv
//!
//! A log-structured key/value store for raw flash sectors with:
//! - Append-only records sealed by CRC-8 and a per-sector generation
//! - Deduplicated writes (rewriting the same value costs no flash)
//! - Round-robin sector rotation with garbage collection
//! - Crash recovery for torn records, interrupted closes and GC passes
//! - Optional key -> address lookup cache
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Store<F>                             │
//! │            (RwLock: one mutation, many readers)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        │              │              │
//!        ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐
//!  │ ops       │  │ gc        │  │ mount     │
//!  │ read/write│  │ rotation  │  │ recovery  │
//!  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘
//!        └──────────────┼──────────────┘
//!                       ▼
//!        ┌─────────────────────────────┐      ┌─────────────┐
//!        │  sector headers + block I/O │◀────▶│ LookupCache │
//!        └──────────────┬──────────────┘      └─────────────┘
//!                       ▼
//!               ┌───────────────┐
//!               │  Flash device │
//!               └───────────────┘
//! ```
//!
//! ## Example
//! ```
//! use sectorkv::{MemFlash, Store, StoreConfig};
//!
//! let store = Store::mount(MemFlash::nor(3 * 4096), StoreConfig::default())?;
//! store.write(1, b"AAAA")?;
//!
//! let mut buf = [0u8; 4];
//! assert_eq!(store.read(1, &mut buf)?, 4);
//! assert_eq!(&buf, b"AAAA");
//! # Ok::<(), sectorkv::KvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod address;
pub mod ate;
pub mod flash;
pub mod cache;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use address::Address;
pub use config::{HistoryPolicy, StoreConfig};
pub use error::{KvError, Result};
pub use flash::{FileFlash, Flash, FlashError, FlashParameters, MemFlash};
pub use store::Store;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of sectorkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
