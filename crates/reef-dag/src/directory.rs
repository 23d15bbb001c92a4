//! Directory assembly: named entries into a UnixFS directory node.

use std::collections::HashSet;

use reef_types::Cid;
use tracing::debug;

use crate::codec::{CidBuilder, DagLink, EncodedNode, encode_directory};
use crate::error::DagError;

/// Collects the entries of one directory and encodes it.
///
/// Entries are kept in the order they were added.
#[derive(Debug)]
pub struct DirectoryBuilder {
    name: String,
    entries: Vec<DagLink>,
    names: HashSet<String>,
}

impl DirectoryBuilder {
    /// Start a directory; `name` is its path relative to the add root.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Path of this directory relative to the add root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a child entry.
    ///
    /// Fails on an empty name, `.`, `..`, a name containing `/`, or a name
    /// already present in this directory.
    pub fn add_entry(&mut self, name: &str, cid: Cid, tsize: u64) -> Result<(), DagError> {
        validate_name(name)?;
        if !self.names.insert(name.to_string()) {
            return Err(DagError::DuplicateEntry {
                directory: self.name.clone(),
                name: name.to_string(),
            });
        }
        self.entries.push(DagLink {
            name: name.to_string(),
            cid,
            tsize,
        });
        Ok(())
    }

    /// Whether an entry called `name` was already added.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry has been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the directory node.
    pub fn build(self, cids: &CidBuilder) -> EncodedNode {
        let node = encode_directory(cids, &self.entries);
        debug!(
            directory = %self.name,
            entries = self.entries.len(),
            cid = %node.cid(),
            "directory assembled"
        );
        node
    }
}

/// Check that `name` can be used as a single path component.
pub fn validate_name(name: &str) -> Result<(), DagError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(DagError::InvalidEntryName(name.to_string()));
    }
    Ok(())
}
