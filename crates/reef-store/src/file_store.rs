//! File-based block storage backend.
//!
//! Stores one file per block, named by the CID's text form, sharded by the
//! two characters before the last one: `{base_dir}/{name[-3..-1]}/{name}`.
//! The leading characters of a CIDv1 are the same for every block of a
//! codec, so the tail spreads blocks evenly across shard directories.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use reef_types::{Block, Cid};
use tracing::{debug, error};

use crate::error::StoreError;
use crate::traits::BlockStore;

/// File-based block store.
///
/// Writes are atomic: data is written to a temporary file first, then
/// renamed into place. Every put gets its own temporary file, so puts of
/// the same block may run concurrently. Reads re-hash the bytes and refuse
/// corrupt blocks.
pub struct FileBlockStore {
    base_dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileBlockStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Compute the full file path for a block.
    fn block_path(&self, cid: &Cid) -> PathBuf {
        let name = cid.to_string();
        let shard = &name[name.len() - 3..name.len() - 1];
        self.base_dir.join(shard).join(&name)
    }

    /// A temporary path next to `path`, unique to this put.
    fn tmp_path(&self, path: &Path) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl BlockStore for FileBlockStore {
    async fn put(&self, block: Block) -> Result<(), StoreError> {
        let path = self.block_path(block.cid());
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.tmp_path(&path);
        let written = match tokio::fs::write(&tmp_path, block.data()).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            // Another put of the same block got there first.
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(cid = %block.cid(), "block stored by a concurrent put");
                return Ok(());
            }
            return Err(e.into());
        }

        debug!(cid = %block.cid(), path = %path.display(), size = block.len(), "stored block to file");
        Ok(())
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError> {
        let path = self.block_path(cid);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                if !cid.verify(&data) {
                    error!(%cid, path = %path.display(), "block corruption detected on read");
                    return Err(StoreError::CorruptBlock {
                        cid: cid.clone(),
                        reason: "stored bytes do not match the identifier".to_string(),
                    });
                }
                Ok(Some(Block::new(cid.clone(), Bytes::from(data))))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.block_path(cid)).await?)
    }

    async fn delete(&self, cid: &Cid) -> Result<(), StoreError> {
        let path = self.block_path(cid);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(%cid, "deleted block file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn list(&self) -> Result<Vec<Cid>, StoreError> {
        let mut cids = Vec::new();

        let mut shards = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(entry) = files.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str()
                    && let Ok(cid) = name.parse::<Cid>()
                {
                    cids.push(cid);
                }
            }
        }
        Ok(cids)
    }
}
