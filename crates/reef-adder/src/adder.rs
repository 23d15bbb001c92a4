//! [`Adder`]: turns a file tree into stored blocks and a pinned root.
//!
//! Files are read one chunk at a time. Each chunk is encoded and stored by
//! a worker task while the next chunk is read; at most
//! `max_concurrent_puts` leaf puts are in flight per file. Leaf links are
//! collected by chunk index, so the DAG shape never depends on the order in
//! which puts complete.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use reef_dag::{
    CidBuilder, Chunk, ChunkReader, Chunker, DagError, DirectoryBuilder, FileLink, LayoutBuilder,
    LeafMode, encode_leaf, validate_name,
};
use reef_store::{BlockStore, Pinner};
use reef_types::{AddEvent, Cid, PosInfo};
use tokio::io::AsyncRead;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AdderConfig;
use crate::error::{AddError, InputError};
use crate::input::{DirectoryInput, FileInput, FileNode};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type LeafResult = Result<(usize, FileLink), AddError>;

/// Lifecycle of an [`Adder`].
///
/// `Reading`, `Building` and `Assembling` repeat as the tree is walked;
/// `Done` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddState {
    /// Created, nothing read yet.
    Idle,
    /// Reading and storing file chunks.
    Reading,
    /// Building the DAG above a file's leaves.
    Building,
    /// Encoding a directory node.
    Assembling,
    /// Pinning the finished root.
    Pinning,
    /// The add succeeded.
    Done,
    /// The add failed or was cancelled.
    Failed,
}

/// An entry that has been fully stored.
#[derive(Debug, Clone)]
struct Added {
    cid: Cid,
    tsize: u64,
    bytes: u64,
}

/// Adds one file tree to a block store.
///
/// An adder is single-use: a second call to
/// [`add_all_and_pin`](Adder::add_all_and_pin) fails with
/// [`AddError::AlreadyStarted`].
pub struct Adder {
    config: AdderConfig,
    blocks: Arc<dyn BlockStore>,
    pinner: Arc<dyn Pinner>,
    cids: CidBuilder,
    chunker: Chunker,
    layout: LayoutBuilder,
    leaf_mode: LeafMode,
    state: Mutex<AddState>,
}

impl Adder {
    /// Create an adder over `blocks`, pinning through `pinner`.
    pub fn new(
        config: AdderConfig,
        blocks: Arc<dyn BlockStore>,
        pinner: Arc<dyn Pinner>,
    ) -> Result<Self, AddError> {
        config.validate()?;
        let cids = CidBuilder::new(config.hash).with_inline_limit(config.inline_limit);
        let leaf_mode = LeafMode::from_raw_leaves(config.raw_leaves);
        let chunker = Chunker::new(config.chunker)?;
        let layout = LayoutBuilder::new(config.layout, cids, leaf_mode)?;

        Ok(Self {
            config,
            blocks,
            pinner,
            cids,
            chunker,
            layout,
            leaf_mode,
            state: Mutex::new(AddState::Idle),
        })
    }

    /// The settings this adder was built with.
    pub fn config(&self) -> &AdderConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AddState {
        *self.state.lock().expect("lock poisoned")
    }

    fn set_state(&self, state: AddState) {
        *self.state.lock().expect("lock poisoned") = state;
    }

    /// Add `root` and everything under it, then pin the resulting root.
    ///
    /// When `events` is given, one completion event is sent per file and
    /// directory, children before parents, and byte-progress events too if
    /// `progress` is set. Sends wait for the receiver, so a slow consumer
    /// slows the add down; a dropped receiver only stops the events. The
    /// sender is dropped before this returns, which closes the stream.
    ///
    /// On any error, including cancellation, nothing is pinned.
    pub async fn add_all_and_pin(
        &self,
        root: FileNode,
        events: Option<mpsc::Sender<AddEvent>>,
        cancel: &CancellationToken,
    ) -> Result<Cid, AddError> {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if *state != AddState::Idle {
                return Err(AddError::AlreadyStarted);
            }
            *state = AddState::Reading;
        }

        let name = root.name().to_string();
        info!(
            root = %name,
            raw_leaves = self.config.raw_leaves,
            no_copy = self.config.no_copy,
            chunker = %self.config.chunker,
            "add: starting"
        );

        let mut sink = EventSink::new(events, self.config.progress);
        let result = self.add_root(root, &mut sink, cancel).await;
        drop(sink);

        match &result {
            Ok(cid) => {
                self.set_state(AddState::Done);
                info!(root = %name, %cid, pinned = self.config.pin, "add: complete");
            }
            Err(e) => {
                self.set_state(AddState::Failed);
                warn!(root = %name, kind = ?e.kind(), error = %e, "add: failed");
            }
        }
        result
    }

    async fn add_root(
        &self,
        root: FileNode,
        sink: &mut EventSink,
        cancel: &CancellationToken,
    ) -> Result<Cid, AddError> {
        let name = root.name().to_string();
        let added = self.add_node(root, name.clone(), sink, cancel).await?;

        let root_cid = if self.config.wrap {
            if cancel.is_cancelled() {
                return Err(AddError::Cancelled);
            }
            self.set_state(AddState::Assembling);
            let mut wrapper = DirectoryBuilder::new("");
            wrapper.add_entry(&name, added.cid, added.tsize)?;
            let node = wrapper.build(&self.cids);
            let cid = node.cid().clone();
            self.blocks.put(node.block).await?;
            sink.added("", cid.clone(), node.tsize, added.bytes, cancel).await?;
            cid
        } else {
            added.cid
        };

        if cancel.is_cancelled() {
            return Err(AddError::Cancelled);
        }
        self.set_state(AddState::Pinning);
        if self.config.pin {
            self.pinner.pin_recursive(&root_cid).await?;
        }
        Ok(root_cid)
    }

    fn add_node<'a>(
        &'a self,
        node: FileNode,
        path: String,
        sink: &'a mut EventSink,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Added, AddError>> {
        Box::pin(async move {
            match node {
                FileNode::File(file) => self.add_file(file, &path, sink, cancel).await,
                FileNode::Directory(dir) => self.add_directory(dir, &path, sink, cancel).await,
            }
        })
    }

    async fn add_directory(
        &self,
        dir: DirectoryInput,
        path: &str,
        sink: &mut EventSink,
        cancel: &CancellationToken,
    ) -> Result<Added, AddError> {
        let DirectoryInput { mut entries, .. } = dir;
        let mut builder = DirectoryBuilder::new(path);
        let mut bytes = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AddError::Cancelled),
                next = entries.next_entry() => next?,
            };
            let Some(child) = next else { break };

            // Reject bad names before the child's content is stored.
            let name = child.name().to_string();
            validate_name(&name)?;
            if builder.contains(&name) {
                return Err(DagError::DuplicateEntry {
                    directory: path.to_string(),
                    name,
                }
                .into());
            }

            let added = self
                .add_node(child, join_path(path, &name), sink, cancel)
                .await?;
            builder.add_entry(&name, added.cid, added.tsize)?;
            bytes += added.bytes;
        }

        if cancel.is_cancelled() {
            return Err(AddError::Cancelled);
        }
        self.set_state(AddState::Assembling);
        let node = builder.build(&self.cids);
        let cid = node.cid().clone();
        let tsize = node.tsize;
        self.blocks.put(node.block).await?;
        sink.added(path, cid.clone(), tsize, bytes, cancel).await?;

        Ok(Added { cid, tsize, bytes })
    }

    async fn add_file(
        &self,
        file: FileInput,
        path: &str,
        sink: &mut EventSink,
        cancel: &CancellationToken,
    ) -> Result<Added, AddError> {
        self.set_state(AddState::Reading);
        let FileInput {
            reader, abs_path, ..
        } = file;

        let source = if self.config.no_copy && self.leaf_mode == LeafMode::Raw {
            match abs_path {
                Some(abs) if abs.is_absolute() => Some(abs),
                _ => return Err(InputError::NoCopyPath(path.to_string()).into()),
            }
        } else {
            None
        };

        let mut chunks = self.chunker.reader(reader);
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<FileLink>> = Vec::new();

        let read = self
            .read_leaves(&mut chunks, &mut tasks, &mut slots, source, path, sink, cancel)
            .await;

        // Let in-flight puts finish even on failure so no write is torn.
        let mut first_error = read.err();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = fill_slot(joined, &mut slots) {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let leaves: Vec<FileLink> = slots
            .into_iter()
            .map(|slot| slot.expect("every leaf task completed"))
            .collect();

        self.set_state(AddState::Building);
        let dag = self.layout.build(&leaves);
        self.blocks.put_many(dag.blocks).await?;

        let root = dag.root;
        debug!(
            path,
            leaves = leaves.len(),
            cid = %root.cid,
            file_size = root.file_size,
            "file added"
        );
        sink.added(path, root.cid.clone(), root.tsize, root.file_size, cancel).await?;

        Ok(Added {
            cid: root.cid,
            tsize: root.tsize,
            bytes: root.file_size,
        })
    }

    /// Read chunks and hand each one to a put worker.
    #[allow(clippy::too_many_arguments)]
    async fn read_leaves<R: AsyncRead + Unpin>(
        &self,
        chunks: &mut ChunkReader<R>,
        tasks: &mut JoinSet<LeafResult>,
        slots: &mut Vec<Option<FileLink>>,
        source: Option<PathBuf>,
        path: &str,
        sink: &mut EventSink,
        cancel: &CancellationToken,
    ) -> Result<(), AddError> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_puts));

        loop {
            while let Some(joined) = tasks.try_join_next() {
                fill_slot(joined, slots)?;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AddError::Cancelled),
                next = chunks.next_chunk() => next?,
            };
            let Some(chunk) = next else {
                return Ok(());
            };
            let read_so_far = chunk.offset + chunk.len() as u64;

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AddError::Cancelled),
                permit = Arc::clone(&permits).acquire_owned() => {
                    permit.expect("put semaphore is never closed")
                }
            };

            let index = slots.len();
            slots.push(None);
            let pos_info = source.as_ref().map(|full_path| PosInfo {
                full_path: full_path.clone(),
                offset: chunk.offset,
                size: chunk.len() as u64,
            });
            let blocks = Arc::clone(&self.blocks);
            let cids = self.cids;
            let mode = self.leaf_mode;

            tasks.spawn(async move {
                let _permit = permit;
                store_leaf(blocks.as_ref(), &cids, mode, chunk, pos_info)
                    .await
                    .map(|link| (index, link))
            });

            sink.progress(path, read_so_far, cancel).await?;
        }
    }
}

async fn store_leaf(
    blocks: &dyn BlockStore,
    cids: &CidBuilder,
    mode: LeafMode,
    chunk: Chunk,
    pos_info: Option<PosInfo>,
) -> Result<FileLink, AddError> {
    let size = chunk.len() as u64;
    let node = encode_leaf(cids, chunk.data, mode);
    let link = node.file_link(size);
    let block = match pos_info {
        Some(pos) => node.block.with_pos_info(pos),
        None => node.block,
    };
    blocks.put(block).await?;
    Ok(link)
}

fn fill_slot(
    joined: Result<LeafResult, tokio::task::JoinError>,
    slots: &mut [Option<FileLink>],
) -> Result<(), AddError> {
    let (index, link) = joined??;
    slots[index] = Some(link);
    Ok(())
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// The sending half of the event stream.
struct EventSink {
    tx: Option<mpsc::Sender<AddEvent>>,
    progress: bool,
}

impl EventSink {
    fn new(tx: Option<mpsc::Sender<AddEvent>>, progress: bool) -> Self {
        Self { tx, progress }
    }

    async fn progress(
        &mut self,
        name: &str,
        bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<(), AddError> {
        if !self.progress {
            return Ok(());
        }
        self.send(AddEvent::progress(name, bytes), cancel).await
    }

    async fn added(
        &mut self,
        name: &str,
        cid: Cid,
        size: u64,
        bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<(), AddError> {
        self.send(AddEvent::added(name, cid, size, bytes), cancel).await
    }

    async fn send(&mut self, event: AddEvent, cancel: &CancellationToken) -> Result<(), AddError> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AddError::Cancelled),
            sent = tx.send(event) => sent.is_ok(),
        };
        if !delivered {
            warn!("event receiver dropped, continuing without events");
            self.tx = None;
        }
        Ok(())
    }
}
