//! Shared test utilities for reef-adder tests.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use reef_store::{BlockStore, MemoryBlockStore, MemoryPinner, PinError, Pinner, StoreError};
use reef_types::{AddEvent, Block, Cid, Pin as PinRecord};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::{Adder, AdderConfig, FileInput, FileNode};

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// An in-memory file node.
pub fn file(name: &str, data: &[u8]) -> FileNode {
    FileNode::File(FileInput::from_bytes(name, data.to_vec()))
}

/// An adder over fresh in-memory stores.
pub fn memory_adder(config: AdderConfig) -> (Adder, Arc<MemoryBlockStore>, Arc<MemoryPinner>) {
    let blocks = Arc::new(MemoryBlockStore::new());
    let pinner = Arc::new(MemoryPinner::new());
    let adder = Adder::new(config, blocks.clone(), pinner.clone()).unwrap();
    (adder, blocks, pinner)
}

/// Drain an event stream until it closes.
pub async fn collect_events(mut rx: mpsc::Receiver<AddEvent>) -> Vec<AddEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Records the position info attached to every block put through it.
pub struct RecordingStore {
    inner: MemoryBlockStore,
    offsets: Mutex<Vec<u64>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryBlockStore::new(),
            offsets: Mutex::new(Vec::new()),
        }
    }

    /// Offsets seen, sorted.
    pub fn offsets(&self) -> Vec<u64> {
        let mut offsets = self.offsets.lock().unwrap().clone();
        offsets.sort_unstable();
        offsets
    }

    /// (blocks at offset zero, blocks at a nonzero offset).
    pub fn offset_counts(&self) -> (usize, usize) {
        let offsets = self.offsets.lock().unwrap();
        let zero = offsets.iter().filter(|&&o| o == 0).count();
        (zero, offsets.len() - zero)
    }
}

#[async_trait::async_trait]
impl BlockStore for RecordingStore {
    async fn put(&self, block: Block) -> Result<(), StoreError> {
        if let Some(pos) = block.pos_info() {
            self.offsets.lock().unwrap().push(pos.offset);
        }
        self.inner.put(block).await
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError> {
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        self.inner.has(cid).await
    }

    async fn delete(&self, cid: &Cid) -> Result<(), StoreError> {
        self.inner.delete(cid).await
    }

    async fn list(&self) -> Result<Vec<Cid>, StoreError> {
        self.inner.list().await
    }
}

/// Accepts `ok_puts` puts, then fails every later one.
pub struct FailingStore {
    inner: MemoryBlockStore,
    ok_puts: usize,
    puts: AtomicUsize,
}

impl FailingStore {
    pub fn new(ok_puts: usize) -> Self {
        Self {
            inner: MemoryBlockStore::new(),
            ok_puts,
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl BlockStore for FailingStore {
    async fn put(&self, block: Block) -> Result<(), StoreError> {
        if self.puts.fetch_add(1, Ordering::SeqCst) >= self.ok_puts {
            return Err(StoreError::Io(io::Error::other("injected put failure")));
        }
        self.inner.put(block).await
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError> {
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        self.inner.has(cid).await
    }

    async fn delete(&self, cid: &Cid) -> Result<(), StoreError> {
        self.inner.delete(cid).await
    }

    async fn list(&self) -> Result<Vec<Cid>, StoreError> {
        self.inner.list().await
    }
}

/// A pinner whose every pin fails.
pub struct FailingPinner;

#[async_trait::async_trait]
impl Pinner for FailingPinner {
    async fn pin_recursive(&self, _cid: &Cid) -> Result<(), PinError> {
        Err(PinError::Backend("injected pin failure".to_string()))
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), PinError> {
        Err(PinError::NotPinned(cid.clone()))
    }

    async fn is_pinned(&self, _cid: &Cid) -> Result<bool, PinError> {
        Ok(false)
    }

    async fn pins(&self) -> Result<Vec<PinRecord>, PinError> {
        Ok(Vec::new())
    }
}

/// A reader that yields `prefix` and then fails.
pub struct FailingReader {
    prefix: Vec<u8>,
}

impl FailingReader {
    pub fn new(prefix: Vec<u8>) -> Self {
        Self { prefix }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.prefix.is_empty() {
            return Poll::Ready(Err(io::Error::other("injected read failure")));
        }
        let n = self.prefix.len().min(buf.remaining());
        buf.put_slice(&self.prefix[..n]);
        self.prefix.drain(..n);
        Poll::Ready(Ok(()))
    }
}

/// A reader that never produces data.
pub struct StalledReader;

impl AsyncRead for StalledReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}
