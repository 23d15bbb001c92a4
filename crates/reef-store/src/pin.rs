//! Pin bookkeeping: roots protected from garbage collection.

use std::collections::HashMap;
use std::sync::RwLock;

use reef_types::{Cid, Pin, PinMode};
use tracing::debug;

use crate::error::PinError;

/// Records which roots must survive garbage collection.
#[async_trait::async_trait]
pub trait Pinner: Send + Sync {
    /// Protect `cid` and everything reachable from it. Idempotent.
    async fn pin_recursive(&self, cid: &Cid) -> Result<(), PinError>;

    /// Remove the pin on `cid`.
    async fn unpin(&self, cid: &Cid) -> Result<(), PinError>;

    /// Whether `cid` is pinned in any mode.
    async fn is_pinned(&self, cid: &Cid) -> Result<bool, PinError>;

    /// All current pins.
    async fn pins(&self) -> Result<Vec<Pin>, PinError>;
}

/// In-memory pin set backed by a `RwLock<HashMap>`.
#[derive(Default)]
pub struct MemoryPinner {
    pins: RwLock<HashMap<Cid, PinMode>>,
}

impl MemoryPinner {
    /// Create an empty pin set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pinned roots.
    pub fn len(&self) -> usize {
        self.pins.read().expect("lock poisoned").len()
    }

    /// Whether nothing is pinned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl Pinner for MemoryPinner {
    async fn pin_recursive(&self, cid: &Cid) -> Result<(), PinError> {
        let mut pins = self.pins.write().expect("lock poisoned");
        // A recursive pin supersedes a direct one.
        pins.insert(cid.clone(), PinMode::Recursive);
        debug!(%cid, "pinned recursively");
        Ok(())
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), PinError> {
        let mut pins = self.pins.write().expect("lock poisoned");
        match pins.remove(cid) {
            Some(_) => {
                debug!(%cid, "unpinned");
                Ok(())
            }
            None => Err(PinError::NotPinned(cid.clone())),
        }
    }

    async fn is_pinned(&self, cid: &Cid) -> Result<bool, PinError> {
        Ok(self.pins.read().expect("lock poisoned").contains_key(cid))
    }

    async fn pins(&self) -> Result<Vec<Pin>, PinError> {
        let pins = self.pins.read().expect("lock poisoned");
        Ok(pins
            .iter()
            .map(|(cid, mode)| Pin {
                cid: cid.clone(),
                mode: *mode,
            })
            .collect())
    }
}
