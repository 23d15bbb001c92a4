//! Streaming chunker that splits a byte stream into ordered chunks.

use bytes::{Bytes, BytesMut};
use reef_types::ChunkerConfig;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::cdc_chunker;
use crate::error::DagError;

/// A contiguous byte range of a source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the original stream.
    pub offset: u64,
    /// The chunk bytes.
    pub data: Bytes,
}

impl Chunk {
    /// Length of the chunk in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk is empty. Chunkers never emit empty chunks.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Splits data according to a [`ChunkerConfig`].
///
/// Fixed-size chunks are `size` bytes except possibly the last one.
/// Content-defined chunks use FastCDC. Empty data produces zero chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker, validating the configuration.
    pub fn new(config: ChunkerConfig) -> Result<Self, DagError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this chunker splits with.
    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Split an in-memory buffer.
    pub fn chunk(&self, data: &[u8]) -> Vec<Chunk> {
        if data.is_empty() {
            return Vec::new();
        }

        let lengths: Vec<usize> = match self.config {
            ChunkerConfig::FixedSize { size } => {
                data.chunks(size as usize).map(<[u8]>::len).collect()
            }
            ChunkerConfig::ContentDefined { min, avg, max } => {
                cdc_chunker::cut_lengths(data, min, avg, max)
            }
        };

        let mut chunks = Vec::with_capacity(lengths.len());
        let mut offset = 0usize;
        for len in lengths {
            chunks.push(Chunk {
                offset: offset as u64,
                data: Bytes::copy_from_slice(&data[offset..offset + len]),
            });
            offset += len;
        }
        chunks
    }

    /// Wrap an async reader into a lazy chunk sequence.
    pub fn reader<R: AsyncRead + Unpin>(&self, reader: R) -> ChunkReader<R> {
        ChunkReader {
            reader,
            config: self.config,
            buf: BytesMut::new(),
            offset: 0,
            eof: false,
        }
    }
}

/// Lazy, forward-only chunk sequence over an async reader.
///
/// Boundaries depend only on the stream bytes and the configuration: a cut is
/// made only once a full `max_chunk_size` window is buffered or the stream
/// has ended, so short reads from the source never move a boundary.
pub struct ChunkReader<R> {
    reader: R,
    config: ChunkerConfig,
    buf: BytesMut,
    offset: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Produce the next chunk, or `None` once the stream is exhausted.
    ///
    /// A read error ends the sequence; callers must treat it as fatal for
    /// the stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, DagError> {
        let window = self.config.max_chunk_size() as usize;
        self.fill(window).await?;

        if self.buf.is_empty() {
            return Ok(None);
        }

        let len = match self.config {
            ChunkerConfig::FixedSize { size } => self.buf.len().min(size as usize),
            ChunkerConfig::ContentDefined { min, avg, max } => {
                cdc_chunker::first_cut(&self.buf, min, avg, max)
            }
        };

        let data = self.buf.split_to(len).freeze();
        let chunk = Chunk {
            offset: self.offset,
            data,
        };
        self.offset += len as u64;
        Ok(Some(chunk))
    }

    /// Bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.offset
    }

    /// Read until `window` bytes are buffered or the stream ends.
    async fn fill(&mut self, window: usize) -> Result<(), DagError> {
        while !self.eof && self.buf.len() < window {
            self.buf.reserve(window - self.buf.len());
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    /// Drain the remaining chunks into a vector.
    pub async fn collect(mut self) -> Result<Vec<Chunk>, DagError> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}
