//! Add configuration.

use reef_types::{AddEvent, ChunkerConfig, HashFunction, Layout, MAX_IDENTITY_LEN};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::AddError;

/// Settings for one add, fixed once the [`Adder`](crate::Adder) is built.
///
/// Deserializes from the `[add]` section of the daemon config; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdderConfig {
    /// Store chunks as `raw` blocks instead of UnixFS leaf nodes.
    pub raw_leaves: bool,
    /// Reference raw leaves in their source file instead of copying them.
    pub no_copy: bool,
    /// Emit byte-count events while files are read.
    pub progress: bool,
    /// How files are split.
    pub chunker: ChunkerConfig,
    /// How chunks are arranged.
    pub layout: Layout,
    /// Hash function for block identifiers.
    pub hash: HashFunction,
    /// Inline blocks of at most this many bytes into their identifier.
    pub inline_limit: Option<usize>,
    /// Wrap the added root in a one-entry directory.
    pub wrap: bool,
    /// Pin the root once every block is stored.
    pub pin: bool,
    /// Upper bound on leaf puts in flight per file.
    pub max_concurrent_puts: usize,
    /// Capacity of the channel returned by [`AdderConfig::event_channel`].
    pub event_buffer: usize,
}

impl Default for AdderConfig {
    fn default() -> Self {
        Self {
            raw_leaves: false,
            no_copy: false,
            progress: false,
            chunker: ChunkerConfig::default(),
            layout: Layout::default(),
            hash: HashFunction::default(),
            inline_limit: None,
            wrap: false,
            pin: true,
            max_concurrent_puts: 8,
            event_buffer: 16,
        }
    }
}

impl AdderConfig {
    /// Check that the settings can be used together.
    pub fn validate(&self) -> Result<(), AddError> {
        self.chunker
            .validate()
            .map_err(|e| AddError::Config(e.to_string()))?;
        self.layout
            .validate()
            .map_err(|e| AddError::Config(e.to_string()))?;
        if self.max_concurrent_puts == 0 {
            return Err(AddError::Config(
                "max_concurrent_puts must be at least 1".to_string(),
            ));
        }
        if self.inline_limit.is_some_and(|limit| limit > MAX_IDENTITY_LEN) {
            return Err(AddError::Config(format!(
                "inline_limit must be at most {MAX_IDENTITY_LEN} bytes"
            )));
        }
        if self.event_buffer == 0 {
            return Err(AddError::Config("event_buffer must be at least 1".to_string()));
        }
        if self.no_copy && !self.raw_leaves {
            warn!("no_copy without raw_leaves: leaves are wrapped and will be stored by copy");
        }
        Ok(())
    }

    /// A bounded event channel sized by `event_buffer`.
    pub fn event_channel(&self) -> (mpsc::Sender<AddEvent>, mpsc::Receiver<AddEvent>) {
        mpsc::channel(self.event_buffer.max(1))
    }
}
