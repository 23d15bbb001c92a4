//! Core trait for block storage.

use reef_types::{Block, Cid};

use crate::error::StoreError;

/// Content-addressed block storage.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Putting a block that is already present is a no-op, so concurrent puts
/// of identical content are safe.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block.
    async fn put(&self, block: Block) -> Result<(), StoreError>;

    /// Store several blocks, stopping at the first failure.
    async fn put_many(&self, blocks: Vec<Block>) -> Result<(), StoreError> {
        for block in blocks {
            self.put(block).await?;
        }
        Ok(())
    }

    /// Retrieve a block. Returns `None` if not found.
    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError>;

    /// Check whether a block exists.
    async fn has(&self, cid: &Cid) -> Result<bool, StoreError>;

    /// Delete a block. Deleting a missing block is not an error.
    async fn delete(&self, cid: &Cid) -> Result<(), StoreError>;

    /// List all stored block identifiers.
    async fn list(&self) -> Result<Vec<Cid>, StoreError>;
}

#[async_trait::async_trait]
impl<T: BlockStore + ?Sized> BlockStore for std::sync::Arc<T> {
    async fn put(&self, block: Block) -> Result<(), StoreError> {
        (**self).put(block).await
    }

    async fn put_many(&self, blocks: Vec<Block>) -> Result<(), StoreError> {
        (**self).put_many(blocks).await
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError> {
        (**self).get(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        (**self).has(cid).await
    }

    async fn delete(&self, cid: &Cid) -> Result<(), StoreError> {
        (**self).delete(cid).await
    }

    async fn list(&self) -> Result<Vec<Cid>, StoreError> {
        (**self).list().await
    }
}
