//! Block encoding: raw leaves, dag-pb nodes and their UnixFS payloads.
//!
//! dag-pb is written canonically: every `Links` entry (field 2) precedes
//! `Data` (field 1), and each link carries `Hash`, `Name` (always present,
//! possibly empty) and `Tsize` in field order. Everything here is pure.

use bytes::Bytes;
use reef_types::varint::{put_uvarint, read_uvarint};
use reef_types::{Block, Cid, Codec, HashFunction, MAX_IDENTITY_LEN, Multihash};

use crate::error::DagError;

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Computes identifiers for freshly encoded blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CidBuilder {
    hash: HashFunction,
    inline_limit: Option<usize>,
}

impl CidBuilder {
    /// Hash every block with `hash`.
    pub fn new(hash: HashFunction) -> Self {
        Self {
            hash,
            inline_limit: None,
        }
    }

    /// Embed blocks of at most `limit` bytes in their identifier.
    ///
    /// Limits above [`MAX_IDENTITY_LEN`] are capped to it.
    pub fn with_inline_limit(mut self, limit: Option<usize>) -> Self {
        self.inline_limit = limit;
        self
    }

    /// The configured hash function.
    pub fn hash(&self) -> HashFunction {
        self.hash
    }

    /// Identifier for `data` interpreted with `codec`.
    pub fn build(&self, codec: Codec, data: &[u8]) -> Cid {
        let inline = self
            .inline_limit
            .filter(|&limit| data.len() <= limit.min(MAX_IDENTITY_LEN))
            .and_then(|_| Multihash::identity(data).ok());
        match inline {
            Some(hash) => Cid::new(codec, hash),
            None => Cid::compute(codec, self.hash, data),
        }
    }

    fn block(&self, codec: Codec, data: Vec<u8>) -> Block {
        let cid = self.build(codec, &data);
        Block::new(cid, Bytes::from(data))
    }
}

// ---------------------------------------------------------------------------
// Links and encoded nodes
// ---------------------------------------------------------------------------

/// A named link from a dag-pb node to a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagLink {
    /// Entry name; empty for file chunk links.
    pub name: String,
    /// The child identifier.
    pub cid: Cid,
    /// Cumulative size of the child's DAG.
    pub tsize: u64,
}

/// A child of a file node: identifier, cumulative size and file bytes covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLink {
    /// The child identifier.
    pub cid: Cid,
    /// Cumulative size of the child's DAG.
    pub tsize: u64,
    /// Bytes of file content under the child.
    pub file_size: u64,
}

/// A block together with the cumulative size of the DAG it roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedNode {
    /// The encoded block.
    pub block: Block,
    /// Encoded length plus the cumulative sizes of all links.
    pub tsize: u64,
}

impl EncodedNode {
    /// The block identifier.
    pub fn cid(&self) -> &Cid {
        self.block.cid()
    }

    /// Link to this node as a file child covering `file_size` bytes.
    pub fn file_link(&self, file_size: u64) -> FileLink {
        FileLink {
            cid: self.cid().clone(),
            tsize: self.tsize,
            file_size,
        }
    }

    /// Link to this node as a directory entry.
    pub fn named_link(&self, name: impl Into<String>) -> DagLink {
        DagLink {
            name: name.into(),
            cid: self.cid().clone(),
            tsize: self.tsize,
        }
    }
}

/// How leaf chunks are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeafMode {
    /// Chunk bytes as a `raw` block.
    Raw,
    /// Chunk bytes inside a dag-pb node with UnixFS `File` data.
    #[default]
    UnixFs,
}

impl LeafMode {
    /// `Raw` when `raw_leaves` is set.
    pub fn from_raw_leaves(raw_leaves: bool) -> Self {
        if raw_leaves { Self::Raw } else { Self::UnixFs }
    }
}

// ---------------------------------------------------------------------------
// UnixFS
// ---------------------------------------------------------------------------

/// UnixFS node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixFsType {
    /// Raw data.
    Raw,
    /// Directory of named links.
    Directory,
    /// File data, inline or spread across links.
    File,
}

impl UnixFsType {
    fn code(self) -> u64 {
        match self {
            Self::Raw => 0,
            Self::Directory => 1,
            Self::File => 2,
        }
    }

    fn from_code(code: u64) -> Result<Self, DagError> {
        match code {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Directory),
            2 => Ok(Self::File),
            _ => Err(DagError::MalformedNode("unsupported unixfs type")),
        }
    }
}

/// The UnixFS payload of a dag-pb node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixFsData {
    /// Node type.
    pub kind: UnixFsType,
    /// Inline file bytes.
    pub data: Bytes,
    /// Total file bytes under this node; files only.
    pub filesize: Option<u64>,
    /// File bytes under each child link, in link order.
    pub blocksizes: Vec<u64>,
}

impl UnixFsData {
    /// A file node with inline `data` and the given child sizes.
    pub fn file(data: Bytes, blocksizes: Vec<u64>) -> Self {
        let filesize = data.len() as u64 + blocksizes.iter().sum::<u64>();
        Self {
            kind: UnixFsType::File,
            data,
            filesize: Some(filesize),
            blocksizes,
        }
    }

    /// An empty directory payload.
    pub fn directory() -> Self {
        Self {
            kind: UnixFsType::Directory,
            data: Bytes::new(),
            filesize: None,
            blocksizes: Vec::new(),
        }
    }

    /// Protobuf bytes of this payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() + 8 + self.blocksizes.len() * 4);
        put_varint_field(&mut buf, 1, self.kind.code());
        if !self.data.is_empty() {
            put_len_field(&mut buf, 2, &self.data);
        }
        if let Some(filesize) = self.filesize {
            put_varint_field(&mut buf, 3, filesize);
        }
        for &size in &self.blocksizes {
            put_varint_field(&mut buf, 4, size);
        }
        buf
    }

    /// Parse a UnixFS payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, DagError> {
        let mut kind = None;
        let mut data = Bytes::new();
        let mut filesize = None;
        let mut blocksizes = Vec::new();

        for field in Fields::new(bytes) {
            match field? {
                (1, Value::Varint(code)) => kind = Some(UnixFsType::from_code(code)?),
                (2, Value::Bytes(bytes)) => data = Bytes::copy_from_slice(bytes),
                (3, Value::Varint(size)) => filesize = Some(size),
                (4, Value::Varint(size)) => blocksizes.push(size),
                (4, Value::Bytes(mut packed)) => {
                    while !packed.is_empty() {
                        let size = read_uvarint(&mut packed)
                            .ok_or(DagError::MalformedNode("truncated packed blocksizes"))?;
                        blocksizes.push(size);
                    }
                }
                (1..=4, _) => return Err(DagError::MalformedNode("unexpected unixfs wire type")),
                _ => {}
            }
        }

        Ok(Self {
            kind: kind.ok_or(DagError::MalformedNode("unixfs type missing"))?,
            data,
            filesize,
            blocksizes,
        })
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode one chunk as a leaf block.
pub fn encode_leaf(cids: &CidBuilder, data: Bytes, mode: LeafMode) -> EncodedNode {
    match mode {
        LeafMode::Raw => {
            let cid = cids.build(Codec::Raw, &data);
            let tsize = data.len() as u64;
            EncodedNode {
                block: Block::new(cid, data),
                tsize,
            }
        }
        LeafMode::UnixFs => {
            let bytes = encode_pb_node(&[], &UnixFsData::file(data, Vec::new()).encode());
            let tsize = bytes.len() as u64;
            EncodedNode {
                block: cids.block(Codec::DagPb, bytes),
                tsize,
            }
        }
    }
}

/// Encode an internal file node over `children`.
pub fn encode_file_node(cids: &CidBuilder, children: &[FileLink]) -> EncodedNode {
    let links: Vec<DagLink> = children
        .iter()
        .map(|child| DagLink {
            name: String::new(),
            cid: child.cid.clone(),
            tsize: child.tsize,
        })
        .collect();
    let blocksizes = children.iter().map(|child| child.file_size).collect();
    let payload = UnixFsData::file(Bytes::new(), blocksizes).encode();
    encode_with_links(cids, &links, &payload)
}

/// Encode a directory node with `entries` in the given order.
pub fn encode_directory(cids: &CidBuilder, entries: &[DagLink]) -> EncodedNode {
    encode_with_links(cids, entries, &UnixFsData::directory().encode())
}

fn encode_with_links(cids: &CidBuilder, links: &[DagLink], payload: &[u8]) -> EncodedNode {
    let bytes = encode_pb_node(links, payload);
    let tsize = bytes.len() as u64 + links.iter().map(|link| link.tsize).sum::<u64>();
    EncodedNode {
        block: cids.block(Codec::DagPb, bytes),
        tsize,
    }
}

fn encode_pb_node(links: &[DagLink], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + links.len() * 48 + 8);
    let mut link_buf = Vec::with_capacity(48);
    for link in links {
        link_buf.clear();
        put_len_field(&mut link_buf, 1, &link.cid.to_bytes());
        put_len_field(&mut link_buf, 2, link.name.as_bytes());
        put_varint_field(&mut link_buf, 3, link.tsize);
        put_len_field(&mut buf, 2, &link_buf);
    }
    put_len_field(&mut buf, 1, data);
    buf
}

fn put_varint_field(buf: &mut Vec<u8>, field: u64, value: u64) {
    put_uvarint(buf, (field << 3) | WIRE_VARINT);
    put_uvarint(buf, value);
}

fn put_len_field(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    put_uvarint(buf, (field << 3) | WIRE_LEN);
    put_uvarint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A parsed dag-pb node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNode {
    /// Links in stored order.
    pub links: Vec<DagLink>,
    /// The UnixFS payload.
    pub unixfs: UnixFsData,
}

/// Parse dag-pb bytes and their UnixFS payload.
pub fn decode_node(bytes: &[u8]) -> Result<DecodedNode, DagError> {
    let mut links = Vec::new();
    let mut data = None;

    for field in Fields::new(bytes) {
        match field? {
            (1, Value::Bytes(payload)) => data = Some(payload),
            (2, Value::Bytes(link)) => links.push(decode_link(link)?),
            (1 | 2, _) => return Err(DagError::MalformedNode("unexpected dag-pb wire type")),
            _ => return Err(DagError::MalformedNode("unknown dag-pb field")),
        }
    }

    let data = data.ok_or(DagError::MalformedNode("dag-pb node has no data"))?;
    Ok(DecodedNode {
        links,
        unixfs: UnixFsData::decode(data)?,
    })
}

fn decode_link(bytes: &[u8]) -> Result<DagLink, DagError> {
    let mut cid = None;
    let mut name = String::new();
    let mut tsize = 0;

    for field in Fields::new(bytes) {
        match field? {
            (1, Value::Bytes(hash)) => {
                cid = Some(Cid::from_bytes(hash).map_err(DagError::InvalidLink)?);
            }
            (2, Value::Bytes(raw)) => {
                name = std::str::from_utf8(raw)
                    .map_err(|_| DagError::MalformedNode("link name is not utf-8"))?
                    .to_string();
            }
            (3, Value::Varint(size)) => tsize = size,
            (1..=3, _) => return Err(DagError::MalformedNode("unexpected link wire type")),
            _ => {}
        }
    }

    Ok(DagLink {
        name,
        cid: cid.ok_or(DagError::MalformedNode("link has no hash"))?,
        tsize,
    })
}

enum Value<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Fixed,
}

/// Iterator over `(field number, value)` pairs of a protobuf message.
struct Fields<'a> {
    input: &'a [u8],
}

impl<'a> Fields<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    fn next_field(&mut self) -> Result<(u64, Value<'a>), DagError> {
        let key = read_uvarint(&mut self.input).ok_or(DagError::MalformedNode("truncated key"))?;
        let value = match key & 0x7 {
            WIRE_VARINT => Value::Varint(
                read_uvarint(&mut self.input).ok_or(DagError::MalformedNode("truncated varint"))?,
            ),
            WIRE_LEN => {
                let len = read_uvarint(&mut self.input)
                    .ok_or(DagError::MalformedNode("truncated length"))?;
                let len = usize::try_from(len)
                    .ok()
                    .filter(|&len| len <= self.input.len())
                    .ok_or(DagError::MalformedNode("length exceeds node"))?;
                let (bytes, rest) = self.input.split_at(len);
                self.input = rest;
                Value::Bytes(bytes)
            }
            WIRE_FIXED64 => self.skip(8)?,
            WIRE_FIXED32 => self.skip(4)?,
            _ => return Err(DagError::MalformedNode("unsupported wire type")),
        };
        Ok((key >> 3, value))
    }

    fn skip(&mut self, len: usize) -> Result<Value<'a>, DagError> {
        if self.input.len() < len {
            return Err(DagError::MalformedNode("truncated fixed field"));
        }
        self.input = &self.input[len..];
        Ok(Value::Fixed)
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<(u64, Value<'a>), DagError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }
        let field = self.next_field();
        if field.is_err() {
            self.input = &[];
        }
        Some(field)
    }
}
