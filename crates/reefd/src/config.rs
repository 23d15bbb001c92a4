//! TOML configuration for the Reef node.

use std::path::{Path, PathBuf};

use anyhow::Context;
use reef_adder::AdderConfig;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Repository location and storage backend.
    pub node: NodeSection,
    /// Defaults for `reefd add`.
    pub add: AdderConfig,
    /// HTTP gateway settings.
    pub gateway: GatewaySection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory holding blocks, pins and the filestore index.
    pub data_dir: PathBuf,
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".reef"))
            .unwrap_or_else(|| PathBuf::from(".reef"));
        Self {
            data_dir,
            backend: "file".to_string(),
        }
    }
}

/// `[gateway]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Address the gateway listens on.
    pub listen_addr: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Whether blocks live only in memory for this process.
    pub fn memory_backend(&self) -> bool {
        self.node.backend == "memory"
    }

    /// Directory of the file block store.
    pub fn blocks_dir(&self) -> PathBuf {
        self.node.data_dir.join("blocks")
    }

    /// Path of the persisted filestore index.
    pub fn filestore_index(&self) -> PathBuf {
        self.node.data_dir.join("filestore.idx")
    }

    /// Path of the pin list.
    pub fn pins_file(&self) -> PathBuf {
        self.node.data_dir.join("pins")
    }
}
