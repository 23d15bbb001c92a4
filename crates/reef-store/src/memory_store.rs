//! In-memory block storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use reef_types::{Block, Cid};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::BlockStore;

/// In-memory block store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for nodes configured to run in memory-only mode.
/// Tracks total bytes stored against an optional maximum.
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Cid, Bytes>>,
    max_bytes: u64,
}

impl MemoryBlockStore {
    /// Create an unbounded in-memory store.
    pub fn new() -> Self {
        Self::with_capacity(u64::MAX)
    }

    /// Create an in-memory store holding at most `max_bytes` of payload.
    pub fn with_capacity(max_bytes: u64) -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            max_bytes,
        }
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes stored.
    pub fn used_bytes(&self) -> u64 {
        let map = self.blocks.read().expect("lock poisoned");
        Self::used_bytes_unlocked(&map)
    }

    /// Return a reference to the inner map (for testing purposes).
    #[cfg(test)]
    pub(crate) fn inner(&self) -> &RwLock<HashMap<Cid, Bytes>> {
        &self.blocks
    }

    fn used_bytes_unlocked(map: &HashMap<Cid, Bytes>) -> u64 {
        map.values().map(|v| v.len() as u64).sum()
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put(&self, block: Block) -> Result<(), StoreError> {
        let mut map = self.blocks.write().expect("lock poisoned");
        if map.contains_key(block.cid()) {
            return Ok(());
        }

        let used = Self::used_bytes_unlocked(&map);
        let needed = block.len() as u64;
        if used.saturating_add(needed) > self.max_bytes {
            return Err(StoreError::CapacityExceeded {
                needed,
                available: self.max_bytes.saturating_sub(used),
            });
        }

        debug!(cid = %block.cid(), size = block.len(), "storing block in memory");
        let (cid, data) = block.into_parts();
        map.insert(cid, data);
        Ok(())
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map
            .get(cid)
            .map(|data| Block::new(cid.clone(), data.clone())))
    }

    async fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(cid))
    }

    async fn delete(&self, cid: &Cid) -> Result<(), StoreError> {
        let mut map = self.blocks.write().expect("lock poisoned");
        map.remove(cid);
        debug!(%cid, "deleted block from memory");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Cid>, StoreError> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }
}
