//! Arranging stored leaves into a file DAG.
//!
//! Both layouts are deterministic for a given leaf sequence and parameters,
//! and every internal node records `blocksizes` so byte offsets can be
//! located top-down.

use bytes::Bytes;
use reef_types::{Block, Layout};
use tracing::debug;

use crate::codec::{CidBuilder, FileLink, LeafMode, encode_file_node, encode_leaf};
use crate::error::DagError;

/// Result of laying out one file.
#[derive(Debug, Clone)]
pub struct FileDag {
    /// Link to the file root.
    pub root: FileLink,
    /// New blocks, children before parents. Leaves passed in are not
    /// repeated here, except the empty leaf made for an empty file.
    pub blocks: Vec<Block>,
}

/// Builds file DAGs from index-ordered leaf links.
#[derive(Debug, Clone, Copy)]
pub struct LayoutBuilder {
    layout: Layout,
    cids: CidBuilder,
    leaf_mode: LeafMode,
}

impl LayoutBuilder {
    /// Create a builder, validating the layout parameters.
    pub fn new(layout: Layout, cids: CidBuilder, leaf_mode: LeafMode) -> Result<Self, DagError> {
        layout.validate()?;
        Ok(Self {
            layout,
            cids,
            leaf_mode,
        })
    }

    /// The configured layout.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Build the DAG above `leaves`.
    ///
    /// No leaves yields a single empty leaf; a single leaf is its own root.
    pub fn build(&self, leaves: &[FileLink]) -> FileDag {
        let mut blocks = Vec::new();

        let root = match leaves {
            [] => {
                let leaf = encode_leaf(&self.cids, Bytes::new(), self.leaf_mode);
                let link = leaf.file_link(0);
                blocks.push(leaf.block);
                link
            }
            [only] => only.clone(),
            _ => match self.layout {
                Layout::Balanced { max_links } => self.balanced(leaves, max_links, &mut blocks),
                Layout::Trickle {
                    max_links,
                    depth_repeat,
                } => {
                    let mut remaining = leaves.iter();
                    self.trickle(&mut remaining, max_links, depth_repeat, None, &mut blocks)
                }
            },
        };

        debug!(
            leaves = leaves.len(),
            nodes = blocks.len(),
            root = %root.cid,
            file_size = root.file_size,
            "file dag built"
        );
        FileDag { root, blocks }
    }

    fn balanced(&self, leaves: &[FileLink], max_links: usize, blocks: &mut Vec<Block>) -> FileLink {
        let mut level = leaves.to_vec();
        while level.len() > 1 {
            level = level
                .chunks(max_links)
                .map(|group| self.file_node(group, blocks))
                .collect();
        }
        // `leaves` has at least two entries, so one node always remains.
        level.swap_remove(0)
    }

    /// A node holding up to `max_links` leaves, followed by `depth_repeat`
    /// subtrees of each depth below `max_depth`.
    fn trickle(
        &self,
        remaining: &mut std::slice::Iter<'_, FileLink>,
        max_links: usize,
        depth_repeat: usize,
        max_depth: Option<usize>,
        blocks: &mut Vec<Block>,
    ) -> FileLink {
        let mut children: Vec<FileLink> = remaining.by_ref().take(max_links).cloned().collect();

        let mut depth = 1;
        while max_depth.is_none_or(|max| depth < max) && !remaining.as_slice().is_empty() {
            for _ in 0..depth_repeat {
                if remaining.as_slice().is_empty() {
                    break;
                }
                let child = self.trickle(remaining, max_links, depth_repeat, Some(depth), blocks);
                children.push(child);
            }
            depth += 1;
        }

        self.file_node(&children, blocks)
    }

    fn file_node(&self, children: &[FileLink], blocks: &mut Vec<Block>) -> FileLink {
        let node = encode_file_node(&self.cids, children);
        let file_size = children.iter().map(|child| child.file_size).sum();
        let link = node.file_link(file_size);
        blocks.push(node.block);
        link
    }
}
