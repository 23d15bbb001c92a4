//! No-copy block storage.
//!
//! A raw block that carries [`PosInfo`] is not copied: the [`Filestore`]
//! records where its bytes live in the original file and reads them back
//! from there on demand. Every other block goes to the backing store.
//!
//! Read-back always re-hashes, so a source file edited after the add shows
//! up as [`StoreError::CorruptBlock`] instead of wrong data.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use bytes::Bytes;
use reef_types::{Block, Cid, Codec, PosInfo};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::traits::BlockStore;

/// Where the bytes of a no-copy block live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilestoreRef {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Byte offset of the block within the file.
    pub offset: u64,
    /// Block length in bytes.
    pub size: u64,
}

impl From<&PosInfo> for FilestoreRef {
    fn from(pos: &PosInfo) -> Self {
        Self {
            path: pos.full_path.clone(),
            offset: pos.offset,
            size: pos.size,
        }
    }
}

/// Block store adapter that keeps raw leaves in their source files.
pub struct Filestore<S> {
    inner: S,
    index: RwLock<BTreeMap<Cid, FilestoreRef>>,
}

impl<S: BlockStore> Filestore<S> {
    /// Wrap `inner`, which receives every block that is not kept by reference.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            index: RwLock::new(BTreeMap::new()),
        }
    }

    /// The backing store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The reference recorded for `cid`, if it is stored by reference.
    pub fn reference(&self, cid: &Cid) -> Option<FilestoreRef> {
        self.index.read().expect("lock poisoned").get(cid).cloned()
    }

    /// Number of blocks stored by reference.
    pub fn reference_count(&self) -> usize {
        self.index.read().expect("lock poisoned").len()
    }

    /// Persist the reference index to `path` (postcard, atomic replace).
    pub async fn save_index(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = {
            let index = self.index.read().expect("lock poisoned");
            postcard::to_allocvec(&*index)?
        };
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        info!(path = %path.display(), entries = self.reference_count(), "saved filestore index");
        Ok(())
    }

    /// Merge a previously saved index from `path`.
    pub async fn load_index(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(path).await?;
        let loaded: BTreeMap<Cid, FilestoreRef> = postcard::from_bytes(&bytes)?;
        let count = loaded.len();
        self.index.write().expect("lock poisoned").extend(loaded);
        info!(path = %path.display(), entries = count, "loaded filestore index");
        Ok(())
    }

    fn validate(block: &Block, pos: &PosInfo) -> Result<(), StoreError> {
        let invalid = |reason| StoreError::InvalidPosInfo {
            cid: block.cid().clone(),
            path: pos.full_path.clone(),
            reason,
        };
        if !pos.full_path.is_absolute() {
            return Err(invalid("path is not absolute"));
        }
        if pos.size != block.len() as u64 {
            return Err(invalid("size does not match block length"));
        }
        Ok(())
    }

    async fn read_reference(&self, cid: &Cid, reference: &FilestoreRef) -> Result<Block, StoreError> {
        let corrupt = |reason: &str| StoreError::CorruptBlock {
            cid: cid.clone(),
            reason: format!("{reason}: {}", reference.path.display()),
        };

        let mut file = match tokio::fs::File::open(&reference.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(corrupt("source file missing"));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        file.seek(SeekFrom::Start(reference.offset)).await?;

        let len = usize::try_from(reference.size).map_err(|_| corrupt("size out of range"))?;
        let mut data = vec![0u8; len];
        match file.read_exact(&mut data).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(corrupt("source file truncated"));
            }
            Err(e) => return Err(StoreError::Io(e)),
        }

        if !cid.verify(&data) {
            error!(%cid, path = %reference.path.display(), offset = reference.offset, "source file changed since add");
            return Err(corrupt("source file changed"));
        }
        Ok(Block::new(cid.clone(), Bytes::from(data)))
    }
}

#[async_trait::async_trait]
impl<S: BlockStore> BlockStore for Filestore<S> {
    async fn put(&self, block: Block) -> Result<(), StoreError> {
        match block.pos_info() {
            Some(pos) if block.cid().codec() == Codec::Raw => {
                Self::validate(&block, pos)?;
                debug!(
                    cid = %block.cid(),
                    path = %pos.full_path.display(),
                    offset = pos.offset,
                    size = pos.size,
                    "recorded no-copy reference"
                );
                self.index
                    .write()
                    .expect("lock poisoned")
                    .insert(block.cid().clone(), FilestoreRef::from(pos));
                Ok(())
            }
            Some(_) => {
                debug!(cid = %block.cid(), "position info on a non-raw block, storing by copy");
                self.inner.put(block).await
            }
            None => self.inner.put(block).await,
        }
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError> {
        match self.reference(cid) {
            Some(reference) => self.read_reference(cid, &reference).await.map(Some),
            None => self.inner.get(cid).await,
        }
    }

    async fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        if self.index.read().expect("lock poisoned").contains_key(cid) {
            return Ok(true);
        }
        self.inner.has(cid).await
    }

    async fn delete(&self, cid: &Cid) -> Result<(), StoreError> {
        self.index.write().expect("lock poisoned").remove(cid);
        self.inner.delete(cid).await
    }

    async fn list(&self) -> Result<Vec<Cid>, StoreError> {
        let mut cids: Vec<Cid> = self
            .index
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        for cid in self.inner.list().await? {
            if !self.index.read().expect("lock poisoned").contains_key(&cid) {
                cids.push(cid);
            }
        }
        Ok(cids)
    }
}
