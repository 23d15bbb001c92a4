//! Error types for adding and reading back file trees.

use std::path::PathBuf;

use reef_dag::DagError;
use reef_store::{PinError, StoreError};
use reef_types::Cid;

/// Coarse classification of an [`AddError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or unreadable input; fix the input and retry.
    Input,
    /// The block store failed; stored blocks are unpinned.
    Store,
    /// Every block was stored but the pin failed.
    Pin,
    /// The caller cancelled the add.
    Cancelled,
    /// Misuse of the adder or an internal fault.
    Internal,
}

/// Errors reading the file-tree input.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The file or directory could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Symlinks, sockets, devices and other special files.
    #[error("unsupported file type at {0}")]
    Unsupported(PathBuf),

    /// A file name that is not valid UTF-8.
    #[error("file name is not valid utf-8: {0}")]
    InvalidName(PathBuf),

    /// No-copy mode needs the absolute path of every file.
    #[error("no-copy requires an absolute path for {0:?}")]
    NoCopyPath(String),
}

/// Errors that end an add.
///
/// Every variant leaves the adder `Failed`, closes the event stream and
/// creates no pin.
#[derive(Debug, thiserror::Error)]
pub enum AddError {
    /// The file-tree input could not be read.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Chunking, encoding or directory assembly failed.
    #[error("dag error: {0}")]
    Dag(#[from] DagError),

    /// The block store rejected a block.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Pinning the finished root failed.
    #[error("pin error: {0}")]
    Pin(#[from] PinError),

    /// The cancellation token fired.
    #[error("add cancelled")]
    Cancelled,

    /// This adder already ran an add.
    #[error("adder already started")]
    AlreadyStarted,

    /// The configuration is incoherent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A put worker panicked.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl AddError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Dag(e) => match e {
                DagError::Io(_) | DagError::DuplicateEntry { .. } | DagError::InvalidEntryName(_) => {
                    ErrorKind::Input
                }
                DagError::MalformedNode(_) | DagError::InvalidLink(_) | DagError::Config(_) => {
                    ErrorKind::Internal
                }
            },
            Self::Store(_) => ErrorKind::Store,
            Self::Pin(_) => ErrorKind::Pin,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::AlreadyStarted | Self::Config(_) | Self::Worker(_) => ErrorKind::Internal,
        }
    }
}

/// Errors reading a DAG back out of a block store.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// A block reachable from the root is missing.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// The root is a directory, not a file.
    #[error("not a file: {0}")]
    NotAFile(Cid),

    /// The root is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(Cid),

    /// The block store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A node could not be decoded.
    #[error("dag error: {0}")]
    Dag(#[from] DagError),
}
