//! Chunking, block encoding and Merkle-DAG assembly.
//!
//! This crate provides:
//! - [`Chunker`] / [`ChunkReader`]: split bytes into chunks, fixed-size or
//!   content-defined (FastCDC).
//! - [`encode_leaf`], [`encode_file_node`], [`encode_directory`]: raw and
//!   dag-pb + UnixFS block encoding, with [`decode_node`] for the reverse.
//! - [`LayoutBuilder`]: balanced and trickle file layouts.
//! - [`DirectoryBuilder`]: named directory nodes.
//! - [`locate`]: byte-offset lookup through `blocksizes`.
//!
//! Nothing here touches storage: callers store the blocks this crate returns.

mod cdc_chunker;
mod chunker;
mod codec;
mod directory;
mod error;
mod layout;
mod reader;

pub use chunker::{Chunk, ChunkReader, Chunker};
pub use codec::{
    CidBuilder, DagLink, DecodedNode, EncodedNode, FileLink, LeafMode, UnixFsData, UnixFsType,
    decode_node, encode_directory, encode_file_node, encode_leaf,
};
pub use directory::{DirectoryBuilder, validate_name};
pub use error::DagError;
pub use layout::{FileDag, LayoutBuilder};
pub use reader::{Position, locate};
