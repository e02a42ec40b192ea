//! Error types for sectorkv
//!
//! Provides a unified error type for all store operations.

use thiserror::Error;

use crate::flash::FlashError;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for sectorkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Store is not mounted")]
    NotReady,

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key not found")]
    NotFound,

    #[error("No space left in the store")]
    NoSpace,

    // -------------------------------------------------------------------------
    // Device Errors
    // -------------------------------------------------------------------------
    #[error("Flash I/O error: {0}")]
    Io(#[from] FlashError),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Data corruption detected: {0}")]
    DataCorrupt(String),

    #[error("Flash content is not a sectorkv store")]
    UnsupportedFormat,

    #[error("Unsupported store version: found {found}, expected {expected}")]
    VersionMismatch { found: u8, expected: u8 },
}
