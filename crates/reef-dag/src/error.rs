//! Error types for chunking, encoding and DAG assembly.

use reef_types::TypesError;

/// Errors that can occur while turning bytes into DAG nodes.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// Reading the source stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A node could not be decoded.
    #[error("malformed node: {0}")]
    MalformedNode(&'static str),

    /// A link inside a node carries an invalid CID.
    #[error("invalid link: {0}")]
    InvalidLink(#[source] TypesError),

    /// Two entries in one directory share a name.
    #[error("duplicate entry {name:?} in directory {directory:?}")]
    DuplicateEntry {
        /// Directory being assembled.
        directory: String,
        /// The repeated entry name.
        name: String,
    },

    /// An entry name is empty or contains a path separator.
    #[error("invalid entry name {0:?}")]
    InvalidEntryName(String),

    /// Chunker or layout parameters are out of range.
    #[error("invalid configuration: {0}")]
    Config(#[from] TypesError),
}
