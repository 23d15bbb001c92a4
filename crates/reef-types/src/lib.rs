//! Shared types and identifiers for Reef.
//!
//! This crate defines the core types used across the Reef workspace:
//! identifiers ([`Cid`], [`Multihash`], [`Codec`], [`HashFunction`]),
//! stored data ([`Block`], [`PosInfo`]), add results ([`AddEvent`], [`Pin`]),
//! and DAG-shaping configuration ([`ChunkerConfig`], [`Layout`]).

mod identifier;
pub mod varint;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use identifier::{Cid, Codec, HashFunction, IDENTITY_CODE, MAX_IDENTITY_LEN, Multihash};

/// Largest chunk any chunker may emit. Blocks above this size are not
/// exchanged between peers, so files must be split below it.
pub const MAX_CHUNK_SIZE: u32 = 1_048_576;

/// Default fixed chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 262_144;

/// Default fan-out of internal file nodes.
pub const DEFAULT_MAX_LINKS: usize = 174;

/// Default number of subtrees added per depth by the trickle layout.
pub const DEFAULT_DEPTH_REPEAT: usize = 4;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing identifiers and configuration strings.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// The CID bytes or text are malformed.
    #[error("invalid cid: {0}")]
    InvalidCid(&'static str),

    /// The CID version is not 1.
    #[error("unsupported cid version {0}")]
    UnsupportedVersion(u64),

    /// The CID names a codec this node cannot interpret.
    #[error("unsupported codec 0x{0:x}")]
    UnsupportedCodec(u64),

    /// The multihash uses an unknown hash function code.
    #[error("unsupported multihash code 0x{0:x}")]
    UnsupportedHashCode(u64),

    /// Data too long to inline as an identity multihash.
    #[error("{0} bytes is too long for an identity hash")]
    IdentityTooLong(usize),

    /// Unknown hash function name.
    #[error("unsupported hash function: {0}")]
    UnsupportedHash(String),

    /// Chunker string could not be parsed or has out-of-range parameters.
    #[error("invalid chunker {spec:?}: {reason}")]
    InvalidChunker {
        /// The offending chunker string.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Layout parameters are out of range.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Where a leaf's bytes live in the original file (no-copy mode).
///
/// Never part of the hashed payload: two blocks with the same bytes and
/// different `PosInfo` have the same [`Cid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PosInfo {
    /// Absolute path of the source file.
    pub full_path: PathBuf,
    /// Byte offset of the leaf within the file.
    pub offset: u64,
    /// Length of the leaf in bytes.
    pub size: u64,
}

/// An immutable, content-addressed block.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Bytes,
    pos_info: Option<PosInfo>,
}

impl Block {
    /// Pair already-hashed bytes with their identifier.
    pub fn new(cid: Cid, data: Bytes) -> Self {
        Self {
            cid,
            data,
            pos_info: None,
        }
    }

    /// Attach the origin of this block's bytes in a source file.
    pub fn with_pos_info(mut self, pos_info: PosInfo) -> Self {
        self.pos_info = Some(pos_info);
        self
    }

    /// The block identifier.
    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    /// The block payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Origin of the payload, if the block was produced in no-copy mode.
    pub fn pos_info(&self) -> Option<&PosInfo> {
        self.pos_info.as_ref()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Re-hash the payload and compare it to the identifier.
    pub fn verify(&self) -> bool {
        self.cid.verify(&self.data)
    }

    /// Split into identifier and payload.
    pub fn into_parts(self) -> (Cid, Bytes) {
        (self.cid, self.data)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("cid", &self.cid)
            .field("len", &self.data.len())
            .field("pos_info", &self.pos_info)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Add results
// ---------------------------------------------------------------------------

/// One snapshot on the add progress stream.
///
/// Byte-progress events carry no `cid`; completion events carry the entry's
/// identifier and cumulative size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEvent {
    /// Path of the entry relative to the add root.
    pub name: String,
    /// Identifier of the completed entry.
    pub cid: Option<Cid>,
    /// Cumulative size of the completed entry's DAG.
    pub size: Option<u64>,
    /// File bytes consumed so far for this entry.
    pub bytes: u64,
}

impl AddEvent {
    /// A byte-progress snapshot.
    pub fn progress(name: impl Into<String>, bytes: u64) -> Self {
        Self {
            name: name.into(),
            cid: None,
            size: None,
            bytes,
        }
    }

    /// A completion snapshot.
    pub fn added(name: impl Into<String>, cid: Cid, size: u64, bytes: u64) -> Self {
        Self {
            name: name.into(),
            cid: Some(cid),
            size: Some(size),
            bytes,
        }
    }

    /// Whether this event only reports bytes read.
    pub fn is_progress(&self) -> bool {
        self.cid.is_none()
    }
}

/// How far a pin's protection extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinMode {
    /// The root and everything reachable from it.
    Recursive,
    /// The root block only.
    Direct,
}

/// A durable reference protecting a root from garbage collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pin {
    /// The protected root.
    pub cid: Cid,
    /// Protection extent.
    pub mode: PinMode,
}

// ---------------------------------------------------------------------------
// DAG-shaping configuration
// ---------------------------------------------------------------------------

/// How a byte stream is split into chunks.
///
/// The text form matches the familiar `--chunker` spelling:
/// `size-<bytes>` or `fastcdc-<min>-<avg>-<max>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChunkerConfig {
    /// Every chunk is `size` bytes except possibly the last.
    FixedSize {
        /// Chunk length in bytes.
        size: u32,
    },
    /// FastCDC content-defined boundaries.
    ContentDefined {
        /// Smallest non-final chunk.
        min: u32,
        /// Target average chunk.
        avg: u32,
        /// Largest chunk.
        max: u32,
    },
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::FixedSize {
            size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkerConfig {
    /// Default content-defined parameters: 16 KiB / 64 KiB / 256 KiB.
    pub fn content_defined() -> Self {
        Self::ContentDefined {
            min: 16_384,
            avg: 65_536,
            max: 262_144,
        }
    }

    /// The largest chunk this configuration can produce.
    pub fn max_chunk_size(&self) -> u32 {
        match *self {
            Self::FixedSize { size } => size,
            Self::ContentDefined { max, .. } => max,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), TypesError> {
        let invalid = |reason: &str| TypesError::InvalidChunker {
            spec: self.to_string(),
            reason: reason.to_string(),
        };
        match *self {
            Self::FixedSize { size } => {
                if size == 0 {
                    return Err(invalid("chunk size must be positive"));
                }
                if size > MAX_CHUNK_SIZE {
                    return Err(invalid("chunk size exceeds the 1 MiB block limit"));
                }
            }
            Self::ContentDefined { min, avg, max } => {
                if min < 64 || avg < 256 || max < 1024 {
                    return Err(invalid("fastcdc requires min >= 64, avg >= 256, max >= 1024"));
                }
                if !(min <= avg && avg <= max) {
                    return Err(invalid("sizes must satisfy min <= avg <= max"));
                }
                if max > MAX_CHUNK_SIZE {
                    return Err(invalid("max exceeds the 1 MiB block limit"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ChunkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedSize { size } => write!(f, "size-{size}"),
            Self::ContentDefined { min, avg, max } => write!(f, "fastcdc-{min}-{avg}-{max}"),
        }
    }
}

impl FromStr for ChunkerConfig {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TypesError::InvalidChunker {
            spec: s.to_string(),
            reason: reason.to_string(),
        };
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| invalid("parameters must be unsigned integers"))
        };

        let config = if s == "default" {
            Self::default()
        } else if let Some(size) = s.strip_prefix("size-") {
            Self::FixedSize { size: parse(size)? }
        } else if s == "fastcdc" {
            Self::content_defined()
        } else if let Some(params) = s.strip_prefix("fastcdc-") {
            let parts: Vec<&str> = params.split('-').collect();
            let &[min, avg, max] = parts.as_slice() else {
                return Err(invalid("expected fastcdc-<min>-<avg>-<max>"));
            };
            Self::ContentDefined {
                min: parse(min)?,
                avg: parse(avg)?,
                max: parse(max)?,
            }
        } else {
            return Err(invalid("unknown chunker"));
        };

        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<String> for ChunkerConfig {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChunkerConfig> for String {
    fn from(value: ChunkerConfig) -> Self {
        value.to_string()
    }
}

/// How leaves are arranged into a file DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Layout {
    /// Fixed fan-out tree built bottom-up.
    Balanced {
        /// Maximum children per internal node.
        #[serde(default = "default_max_links")]
        max_links: usize,
    },
    /// Leaves first, then subtrees of growing depth.
    Trickle {
        /// Maximum leaves directly under each node.
        #[serde(default = "default_max_links")]
        max_links: usize,
        /// Subtrees added per depth before the depth grows.
        #[serde(default = "default_depth_repeat")]
        depth_repeat: usize,
    },
}

fn default_max_links() -> usize {
    DEFAULT_MAX_LINKS
}

fn default_depth_repeat() -> usize {
    DEFAULT_DEPTH_REPEAT
}

impl Default for Layout {
    fn default() -> Self {
        Self::Balanced {
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

impl Layout {
    /// The default trickle layout.
    pub fn trickle() -> Self {
        Self::Trickle {
            max_links: DEFAULT_MAX_LINKS,
            depth_repeat: DEFAULT_DEPTH_REPEAT,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), TypesError> {
        match *self {
            Self::Balanced { max_links } if max_links < 2 => Err(TypesError::InvalidLayout(
                format!("max_links must be at least 2, got {max_links}"),
            )),
            Self::Trickle { max_links, .. } if max_links < 1 => Err(TypesError::InvalidLayout(
                format!("max_links must be at least 1, got {max_links}"),
            )),
            Self::Trickle { depth_repeat, .. } if depth_repeat < 1 => Err(
                TypesError::InvalidLayout("depth_repeat must be at least 1".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
