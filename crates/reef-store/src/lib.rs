//! Block storage, no-copy references and pinning.
//!
//! This crate defines the [`BlockStore`] trait for persisting
//! content-addressed blocks, along with its backends:
//!
//! - [`MemoryBlockStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileBlockStore`]: one file per block in sharded directories.
//! - [`Filestore`]: keeps raw leaves in their source files (no-copy mode).
//! - [`SlowStore`]: latency-injecting wrapper for tests.
//!
//! Pins live behind the [`Pinner`] trait, with [`MemoryPinner`] as the
//! in-memory implementation.

mod error;
mod file_store;
mod filestore;
mod memory_store;
mod pin;
mod slow_store;
mod traits;

pub use error::{PinError, StoreError};
pub use file_store::FileBlockStore;
pub use filestore::{Filestore, FilestoreRef};
pub use memory_store::MemoryBlockStore;
pub use pin::{MemoryPinner, Pinner};
pub use slow_store::SlowStore;
pub use traits::BlockStore;
