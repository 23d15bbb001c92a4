//! The add pipeline: file trees in, pinned Merkle-DAG roots out.
//!
//! [`Adder`] drives [`reef_dag`] and [`reef_store`] to chunk, encode and
//! store a [`FileNode`] tree, reporting progress over a bounded channel and
//! honouring a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! The [`reader`] functions read stored DAGs back.

mod adder;
mod config;
mod error;
mod input;
pub mod reader;

pub use adder::{AddState, Adder};
pub use config::AdderConfig;
pub use error::{AddError, ErrorKind, InputError, ReadError};
pub use input::{DirectoryEntries, DirectoryInput, FileInput, FileNode, FsDirectory, MemoryDirectory};
pub use reader::{list_directory, read_file, read_range};

#[cfg(test)]
mod tests;
