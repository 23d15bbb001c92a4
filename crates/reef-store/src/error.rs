//! Error types for block storage and pinning.

use std::path::PathBuf;

use reef_types::Cid;

/// Errors that can occur during block storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has reached its capacity limit.
    #[error("store capacity exceeded: need {needed} bytes, only {available} available")]
    CapacityExceeded {
        /// Bytes needed for the operation.
        needed: u64,
        /// Bytes currently available.
        available: u64,
    },

    /// Bytes read back do not hash to the requested identifier.
    ///
    /// The block is not returned to the caller.
    #[error("block corruption detected for {cid}: {reason}")]
    CorruptBlock {
        /// The identifier that was requested.
        cid: Cid,
        /// What was wrong with the bytes.
        reason: String,
    },

    /// A no-copy reference cannot be recorded.
    #[error("invalid position info for {cid} ({path}): {reason}")]
    InvalidPosInfo {
        /// The block carrying the reference.
        cid: Cid,
        /// The referenced file.
        path: PathBuf,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The filestore index could not be encoded or decoded.
    #[error("filestore index error: {0}")]
    Index(#[from] postcard::Error),
}

/// Errors from pin bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum PinError {
    /// The root is not pinned.
    #[error("not pinned: {0}")]
    NotPinned(Cid),

    /// The pin backend failed.
    #[error("pin backend error: {0}")]
    Backend(String),

    /// Reading or writing blocks failed while pinning.
    #[error(transparent)]
    Store(#[from] StoreError),
}
