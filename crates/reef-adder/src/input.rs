//! File-tree input: a file stream or a lazily walked directory.

use std::collections::VecDeque;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::InputError;

/// One node of the tree being added.
pub enum FileNode {
    /// A readable byte stream.
    File(FileInput),
    /// A directory of further nodes.
    Directory(DirectoryInput),
}

impl FileNode {
    /// Entry name within the parent directory.
    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => &file.name,
            Self::Directory(dir) => &dir.name,
        }
    }

    /// Open a file or directory on disk.
    ///
    /// Directories are walked lazily: children are listed now but opened
    /// only when reached. Symlinks and special files are rejected.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let name = file_name(path)?;
        Self::open_named(path, name).await
    }

    async fn open_named(path: &Path, name: String) -> Result<Self, InputError> {
        let io_err = |source| InputError::Io {
            path: path.to_path_buf(),
            source,
        };
        let meta = tokio::fs::symlink_metadata(path).await.map_err(io_err)?;
        let kind = meta.file_type();

        if kind.is_file() {
            let abs_path = std::path::absolute(path).map_err(io_err)?;
            let file = tokio::fs::File::open(path).await.map_err(io_err)?;
            Ok(Self::File(FileInput {
                name,
                size: Some(meta.len()),
                mod_time: meta.modified().ok(),
                abs_path: Some(abs_path),
                reader: Box::new(file),
            }))
        } else if kind.is_dir() {
            let entries = FsDirectory::open(path).await?;
            Ok(Self::Directory(DirectoryInput::new(name, entries)))
        } else {
            Err(InputError::Unsupported(path.to_path_buf()))
        }
    }
}

impl fmt::Debug for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(file) => file.fmt(f),
            Self::Directory(dir) => f
                .debug_struct("DirectoryInput")
                .field("name", &dir.name)
                .finish_non_exhaustive(),
        }
    }
}

/// A file to add: a byte stream plus what is known about it.
pub struct FileInput {
    /// Entry name.
    pub name: String,
    /// Declared size, if known.
    pub size: Option<u64>,
    /// Last modification time, if known.
    pub mod_time: Option<SystemTime>,
    /// Absolute path of the source file; required for no-copy adds.
    pub abs_path: Option<PathBuf>,
    /// The content.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl FileInput {
    /// A file read from any async stream.
    pub fn from_reader(name: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            size: None,
            mod_time: None,
            abs_path: None,
            reader: Box::new(reader),
        }
    }

    /// A file whose content is already in memory.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            size: Some(data.len() as u64),
            ..Self::from_reader(name, Cursor::new(data))
        }
    }

    /// Record where the content lives on disk.
    pub fn with_abs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.abs_path = Some(path.into());
        self
    }

    /// Record the modification time.
    pub fn with_mod_time(mut self, mod_time: SystemTime) -> Self {
        self.mod_time = Some(mod_time);
        self
    }
}

impl fmt::Debug for FileInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInput")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("abs_path", &self.abs_path)
            .finish_non_exhaustive()
    }
}

/// A directory to add.
pub struct DirectoryInput {
    /// Entry name.
    pub name: String,
    /// Children, yielded in order.
    pub entries: Box<dyn DirectoryEntries>,
}

impl DirectoryInput {
    /// A directory yielding `entries`.
    pub fn new(name: impl Into<String>, entries: impl DirectoryEntries + 'static) -> Self {
        Self {
            name: name.into(),
            entries: Box::new(entries),
        }
    }

    /// An in-memory directory with the given children.
    pub fn from_nodes(name: impl Into<String>, nodes: impl IntoIterator<Item = FileNode>) -> Self {
        Self::new(name, MemoryDirectory::new(nodes))
    }
}

/// Lazily yields the children of a directory.
#[async_trait::async_trait]
pub trait DirectoryEntries: Send {
    /// The next child, or `None` when the directory is exhausted.
    async fn next_entry(&mut self) -> Result<Option<FileNode>, InputError>;
}

/// Children held in memory.
pub struct MemoryDirectory {
    nodes: VecDeque<FileNode>,
}

impl MemoryDirectory {
    /// Yield `nodes` in the given order.
    pub fn new(nodes: impl IntoIterator<Item = FileNode>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl DirectoryEntries for MemoryDirectory {
    async fn next_entry(&mut self) -> Result<Option<FileNode>, InputError> {
        Ok(self.nodes.pop_front())
    }
}

/// Children of a directory on disk, sorted byte-wise by name.
pub struct FsDirectory {
    dir: PathBuf,
    names: std::vec::IntoIter<String>,
}

impl FsDirectory {
    /// List `dir`. Children are opened one by one as they are yielded.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, InputError> {
        let dir = dir.as_ref().to_path_buf();
        let io_err = |source| InputError::Io {
            path: dir.clone(),
            source,
        };

        let mut names = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
        while let Some(entry) = read_dir.next_entry().await.map_err(io_err)? {
            let name = entry
                .file_name()
                .into_string()
                .map_err(|_| InputError::InvalidName(entry.path()))?;
            names.push(name);
        }
        names.sort();

        Ok(Self {
            dir,
            names: names.into_iter(),
        })
    }
}

#[async_trait::async_trait]
impl DirectoryEntries for FsDirectory {
    async fn next_entry(&mut self) -> Result<Option<FileNode>, InputError> {
        let Some(name) = self.names.next() else {
            return Ok(None);
        };
        let path = self.dir.join(&name);
        FileNode::open_named(&path, name).await.map(Some)
    }
}

fn file_name(path: &Path) -> Result<String, InputError> {
    let absolute = std::path::absolute(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = absolute
        .file_name()
        .unwrap_or(absolute.as_os_str())
        .to_str()
        .ok_or_else(|| InputError::InvalidName(path.to_path_buf()))?;
    Ok(name.to_string())
}
