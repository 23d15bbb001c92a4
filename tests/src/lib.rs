//! Shared test harness for Reef integration tests.
//!
//! Provides [`TestRepo`]: a block store (in memory, on disk, or with
//! injected latency) wrapped in a [`Filestore`], a pin set, and a scratch
//! directory for source files. Tests drive the full pipeline through it:
//! input tree → chunking → layout → block store → pin → read back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reef_adder::{AddError, Adder, AdderConfig, FileInput, FileNode, read_file};
use reef_gateway::Gateway;
use reef_store::{
    BlockStore, FileBlockStore, Filestore, MemoryBlockStore, MemoryPinner, SlowStore,
};
use reef_types::{AddEvent, Cid};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// The block store type every test repo exposes.
pub type Blocks = Filestore<Arc<dyn BlockStore>>;

// =========================================================================
// TestRepo
// =========================================================================

/// A local repository for one test.
pub struct TestRepo {
    blocks: Arc<Blocks>,
    pinner: Arc<MemoryPinner>,
    /// Holds source files, and the block directory for on-disk repos.
    scratch: Arc<TempDir>,
    /// Set for on-disk repos.
    blocks_dir: Option<PathBuf>,
}

impl TestRepo {
    /// Blocks kept in memory.
    pub fn memory() -> Self {
        Self::with_store(Arc::new(MemoryBlockStore::new()))
    }

    /// Blocks written to a sharded directory under the scratch dir.
    pub fn on_disk() -> Self {
        let scratch = Arc::new(TempDir::new().unwrap());
        Self::open_dir(scratch)
    }

    /// In-memory blocks behind random per-operation latency.
    pub fn slow(seed: u64) -> Self {
        let inner: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
        let slow = SlowStore::new(inner)
            .read_latency(0, 2)
            .write_latency(1, 10)
            .seed(seed);
        Self::with_store(Arc::new(slow))
    }

    fn with_store(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            blocks: Arc::new(Filestore::new(inner)),
            pinner: Arc::new(MemoryPinner::new()),
            scratch: Arc::new(TempDir::new().unwrap()),
            blocks_dir: None,
        }
    }

    fn open_dir(scratch: Arc<TempDir>) -> Self {
        let blocks_dir = scratch.path().join("blocks");
        let inner: Arc<dyn BlockStore> = Arc::new(FileBlockStore::new(&blocks_dir).unwrap());
        Self {
            blocks: Arc::new(Filestore::new(inner)),
            pinner: Arc::new(MemoryPinner::new()),
            scratch,
            blocks_dir: Some(blocks_dir),
        }
    }

    /// Open the same on-disk repository again, as a restarted node would.
    ///
    /// The filestore index is saved and reloaded; pins are not carried over.
    pub async fn reopen(&self) -> Self {
        assert!(self.blocks_dir.is_some(), "only on-disk repos can be reopened");
        let index = self.scratch.path().join("filestore.idx");
        self.blocks.save_index(&index).await.unwrap();

        let reopened = Self::open_dir(self.scratch.clone());
        reopened.blocks.load_index(&index).await.unwrap();
        reopened
    }

    /// The repository as a plain block store.
    pub fn blocks(&self) -> Arc<dyn BlockStore> {
        self.blocks.clone()
    }

    /// The no-copy adapter, for inspecting references.
    pub fn filestore(&self) -> &Blocks {
        &self.blocks
    }

    /// The pin set.
    pub fn pinner(&self) -> &MemoryPinner {
        &self.pinner
    }

    /// Directory for source files.
    pub fn scratch(&self) -> &Path {
        self.scratch.path()
    }

    /// Write a source file under the scratch dir and return its path.
    pub fn write_source(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.scratch().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    /// A fresh adder over this repository.
    pub fn adder(&self, config: AdderConfig) -> Adder {
        Adder::new(config, self.blocks.clone(), self.pinner.clone()).unwrap()
    }

    /// Add `root` and collect every event it produced.
    pub async fn add(
        &self,
        config: AdderConfig,
        root: FileNode,
    ) -> Result<(Cid, Vec<AddEvent>), AddError> {
        self.add_with_cancel(config, root, &CancellationToken::new())
            .await
    }

    /// Like [`add`](Self::add), observing `cancel`.
    pub async fn add_with_cancel(
        &self,
        config: AdderConfig,
        root: FileNode,
        cancel: &CancellationToken,
    ) -> Result<(Cid, Vec<AddEvent>), AddError> {
        let adder = self.adder(config);
        let (tx, mut rx) = adder.config().event_channel();
        let collector = tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        });
        let result = adder.add_all_and_pin(root, Some(tx), cancel).await;
        let events = collector.await.unwrap();
        result.map(|cid| (cid, events))
    }

    /// Add an in-memory file and return its root.
    pub async fn add_bytes(&self, config: AdderConfig, name: &str, data: &[u8]) -> Cid {
        let node = FileNode::File(FileInput::from_bytes(name, data.to_vec()));
        self.add(config, node).await.unwrap().0
    }

    /// Add a path from the local filesystem and return its root.
    pub async fn add_path(&self, config: AdderConfig, path: &Path) -> Cid {
        let node = FileNode::open(path).await.unwrap();
        self.add(config, node).await.unwrap().0
    }

    /// Read a whole file back.
    pub async fn cat(&self, cid: &Cid) -> Vec<u8> {
        read_file(self.blocks.as_ref(), cid).await.unwrap().to_vec()
    }

    /// Number of blocks held by the backing store (excluding references).
    pub async fn stored_block_count(&self) -> usize {
        self.blocks.inner().list().await.unwrap().len()
    }

    /// An HTTP gateway over this repository.
    pub fn gateway(&self) -> axum::Router {
        Gateway::new(self.blocks.clone()).into_router()
    }
}

// =========================================================================
// Data helpers
// =========================================================================

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    test_data_seeded(size, 0xDEAD_BEEF)
}

/// Generate test data with a specific seed (for unique files).
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Names of the completion events, in emission order.
pub fn added_names(events: &[AddEvent]) -> Vec<&str> {
    events
        .iter()
        .filter(|e| !e.is_progress())
        .map(|e| e.name.as_str())
        .collect()
}
