//! A [`BlockStore`] wrapper that delays operations by block identifier.
//!
//! Each operation sleeps for a duration drawn from a generator seeded by the
//! store seed and the block's CID. Puts of the same block therefore wait the
//! same time and reach the inner store together, which is the case a sparse
//! or repetitive file produces when its leaves are stored concurrently.
//! Different blocks finish out of order.
//!
//! The wrapper also counts puts per CID and the peak number of puts in
//! flight, so tests can check how an add drove the store.
//!
//! ```ignore
//! let slow = SlowStore::new(inner)
//!     .read_latency(0, 2)
//!     .write_latency(1, 10)
//!     .seed(42);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reef_types::{Block, Cid};

use crate::error::StoreError;
use crate::traits::BlockStore;

const READ_SALT: u64 = 0x5245_4144;
const WRITE_SALT: u64 = 0x5752_4954;

/// Fold a CID's binary form into a generator seed.
fn cid_key(cid: &Cid) -> u64 {
    let mut key = [0u8; 8];
    for (i, byte) in cid.to_bytes().iter().enumerate() {
        key[i % 8] ^= byte;
    }
    u64::from_le_bytes(key)
}

/// Latency-injecting store for concurrency tests.
pub struct SlowStore {
    inner: Arc<dyn BlockStore>,
    read_latency_ms: (u64, u64),
    write_latency_ms: (u64, u64),
    seed: u64,
    puts: Mutex<HashMap<Cid, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SlowStore {
    /// Wrap an existing store with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            inner,
            read_latency_ms: (0, 0),
            write_latency_ms: (0, 0),
            seed: 0,
            puts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Read latency range in milliseconds.
    pub fn read_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.read_latency_ms = (min_ms, max_ms);
        self
    }

    /// Write latency range in milliseconds.
    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.write_latency_ms = (min_ms, max_ms);
        self
    }

    /// Seed mixed into every per-CID delay.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of puts seen for `cid`, including duplicates.
    pub fn put_count(&self, cid: &Cid) -> usize {
        self.puts
            .lock()
            .expect("lock poisoned")
            .get(cid)
            .copied()
            .unwrap_or(0)
    }

    /// Puts of a CID that had already been put at least once.
    pub fn duplicate_puts(&self) -> usize {
        self.puts
            .lock()
            .expect("lock poisoned")
            .values()
            .map(|n| n.saturating_sub(1))
            .sum()
    }

    /// Most puts that were in flight at the same time.
    pub fn peak_concurrent_puts(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Delay for an operation on `cid`, in milliseconds.
    fn delay_ms(&self, cid: &Cid, range: (u64, u64), salt: u64) -> u64 {
        let (min, max) = range;
        if min >= max {
            return min;
        }
        StdRng::seed_from_u64(self.seed ^ salt ^ cid_key(cid)).random_range(min..=max)
    }

    async fn delay(&self, cid: &Cid, range: (u64, u64), salt: u64) {
        let ms = self.delay_ms(cid, range, salt);
        if ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
        }
    }
}

/// Counts a put as in flight until dropped, including when cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl BlockStore for SlowStore {
    async fn put(&self, block: Block) -> Result<(), StoreError> {
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        *self
            .puts
            .lock()
            .expect("lock poisoned")
            .entry(block.cid().clone())
            .or_default() += 1;
        self.delay(block.cid(), self.write_latency_ms, WRITE_SALT).await;
        self.inner.put(block).await
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, StoreError> {
        self.delay(cid, self.read_latency_ms, READ_SALT).await;
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        self.delay(cid, self.read_latency_ms, READ_SALT).await;
        self.inner.has(cid).await
    }

    async fn delete(&self, cid: &Cid) -> Result<(), StoreError> {
        self.delay(cid, self.write_latency_ms, WRITE_SALT).await;
        self.inner.delete(cid).await
    }

    async fn list(&self) -> Result<Vec<Cid>, StoreError> {
        self.inner.list().await
    }
}
