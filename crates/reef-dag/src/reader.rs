//! Byte-offset lookup inside decoded file nodes.

use crate::codec::{DecodedNode, UnixFsType};
use crate::error::DagError;

/// Where a file byte offset falls within one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Inside the node's inline data, at this offset.
    Inline(u64),
    /// Inside child `index`, at `offset` relative to that child.
    Child {
        /// Link index.
        index: usize,
        /// Offset within the child's content.
        offset: u64,
    },
    /// At or past the end of the node's content.
    End,
}

/// Find the part of `node` holding file byte `offset`.
///
/// Uses `blocksizes` only, so no child needs to be fetched.
pub fn locate(node: &DecodedNode, offset: u64) -> Result<Position, DagError> {
    if node.unixfs.kind == UnixFsType::Directory {
        return Err(DagError::MalformedNode("cannot seek inside a directory"));
    }
    if node.unixfs.blocksizes.len() != node.links.len() {
        return Err(DagError::MalformedNode("blocksizes do not match links"));
    }

    let inline = node.unixfs.data.len() as u64;
    if offset < inline {
        return Ok(Position::Inline(offset));
    }

    let mut start = inline;
    for (index, &size) in node.unixfs.blocksizes.iter().enumerate() {
        if offset < start + size {
            return Ok(Position::Child {
                index,
                offset: offset - start,
            });
        }
        start += size;
    }
    Ok(Position::End)
}
