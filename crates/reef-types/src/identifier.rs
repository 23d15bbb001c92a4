//! Self-describing content identifiers.
//!
//! A [`Cid`] names a block by the codec that interprets its bytes and a
//! [`Multihash`] of those bytes. Both wrap the `cid` crate's types and narrow
//! them to what the DAG layer understands: version-1 CIDs, the `raw` and
//! `dag-pb` codecs, and SHA2-256, BLAKE3 or identity hashes. The text form is
//! multibase base32 (lower case, `b` prefix).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ::cid::multibase::{self, Base};
use ::cid::multihash::Multihash as RawMultihash;
use sha2::{Digest, Sha256};

use crate::TypesError;
use crate::varint::read_uvarint;

const CID_VERSION: u64 = 1;

/// Longest digest a [`Multihash`] holds, and so the largest inlined block.
pub const MAX_IDENTITY_LEN: usize = 64;

/// Block codecs understood by the DAG layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    /// Opaque bytes: a raw leaf.
    Raw,
    /// Protobuf-framed node with links.
    DagPb,
}

impl Codec {
    /// Multicodec table code.
    pub fn code(self) -> u64 {
        match self {
            Self::Raw => 0x55,
            Self::DagPb => 0x70,
        }
    }

    /// Look up a codec by its multicodec code.
    pub fn from_code(code: u64) -> Result<Self, TypesError> {
        match code {
            0x55 => Ok(Self::Raw),
            0x70 => Ok(Self::DagPb),
            other => Err(TypesError::UnsupportedCodec(other)),
        }
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::DagPb => f.write_str("dag-pb"),
        }
    }
}

/// Hash functions a block identifier may be computed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HashFunction {
    /// SHA2-256, the default for interoperability.
    #[default]
    #[serde(rename = "sha2-256")]
    Sha2_256,
    /// BLAKE3 with a 32-byte digest.
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashFunction {
    /// Multihash table code.
    pub fn code(self) -> u64 {
        match self {
            Self::Sha2_256 => 0x12,
            Self::Blake3 => 0x1e,
        }
    }

    fn digest(self, data: &[u8]) -> [u8; 32] {
        match self {
            Self::Sha2_256 => {
                let mut out = [0u8; 32];
                out.copy_from_slice(&Sha256::digest(data));
                out
            }
            Self::Blake3 => *blake3::hash(data).as_bytes(),
        }
    }
}

impl FromStr for HashFunction {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha2-256" => Ok(Self::Sha2_256),
            "blake3" => Ok(Self::Blake3),
            other => Err(TypesError::UnsupportedHash(other.to_string())),
        }
    }
}

/// Multihash code of the identity "hash", whose digest is the data itself.
pub const IDENTITY_CODE: u64 = 0x00;

fn known_hash_code(code: u64) -> bool {
    matches!(code, IDENTITY_CODE | 0x12 | 0x1e)
}

/// A hash function code together with its digest.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Multihash(RawMultihash<MAX_IDENTITY_LEN>);

impl Multihash {
    /// Hash `data` with the given function.
    pub fn digest(function: HashFunction, data: &[u8]) -> Self {
        let digest = function.digest(data);
        Self(RawMultihash::wrap(function.code(), &digest).expect("32-byte digest fits"))
    }

    /// Embed `data` verbatim as an identity multihash.
    pub fn identity(data: &[u8]) -> Result<Self, TypesError> {
        RawMultihash::wrap(IDENTITY_CODE, data)
            .map(Self)
            .map_err(|_| TypesError::IdentityTooLong(data.len()))
    }

    /// Multihash code.
    pub fn code(&self) -> u64 {
        self.0.code()
    }

    /// Raw digest bytes.
    pub fn digest_bytes(&self) -> &[u8] {
        self.0.digest()
    }

    /// Whether this is an identity multihash (data inlined in the identifier).
    pub fn is_identity(&self) -> bool {
        self.code() == IDENTITY_CODE
    }

    /// Check that `data` hashes to this multihash.
    pub fn matches(&self, data: &[u8]) -> bool {
        let digest = self.digest_bytes();
        match self.code() {
            IDENTITY_CODE => digest == data,
            0x12 => Sha256::digest(data).as_slice() == digest,
            0x1e => blake3::hash(data).as_bytes() == digest,
            _ => false,
        }
    }
}

impl Ord for Multihash {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.code(), self.digest_bytes()).cmp(&(other.code(), other.digest_bytes()))
    }
}

impl PartialOrd for Multihash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multihash(0x{:02x}:{})", self.code(), hex::encode(self.digest_bytes()))
    }
}

/// Version-1 content identifier: codec plus multihash.
///
/// Serializes as its binary form.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Cid {
    inner: ::cid::Cid,
    codec: Codec,
    hash: Multihash,
}

impl Cid {
    /// Build a CID from its parts.
    pub fn new(codec: Codec, hash: Multihash) -> Self {
        Self {
            inner: ::cid::Cid::new_v1(codec.code(), hash.0),
            codec,
            hash,
        }
    }

    /// Hash `data` and build the CID for a block of the given codec.
    pub fn compute(codec: Codec, function: HashFunction, data: &[u8]) -> Self {
        Self::new(codec, Multihash::digest(function, data))
    }

    /// The codec that interprets the block bytes.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The multihash of the block bytes.
    pub fn hash(&self) -> &Multihash {
        &self.hash
    }

    /// Binary form: `version ++ codec ++ multihash`, all varint-framed.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes()
    }

    /// Parse the binary form, rejecting trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        let mut input = bytes;
        let cid = Self::read_bytes(&mut input)?;
        if !input.is_empty() {
            return Err(TypesError::InvalidCid("trailing bytes"));
        }
        Ok(cid)
    }

    /// Parse a binary CID from the front of `input`, advancing it.
    pub fn read_bytes(input: &mut &[u8]) -> Result<Self, TypesError> {
        let mut peek = *input;
        let version = read_uvarint(&mut peek).ok_or(TypesError::InvalidCid("truncated version"))?;
        if version != CID_VERSION {
            return Err(TypesError::UnsupportedVersion(version));
        }
        let inner = ::cid::Cid::read_bytes(&mut *input)
            .map_err(|_| TypesError::InvalidCid("malformed cid"))?;
        let codec = Codec::from_code(inner.codec())?;
        let hash = *inner.hash();
        if !known_hash_code(hash.code()) {
            return Err(TypesError::UnsupportedHashCode(hash.code()));
        }
        Ok(Self {
            inner,
            codec,
            hash: Multihash(hash),
        })
    }

    /// Check that `data` is the content this CID names.
    pub fn verify(&self, data: &[u8]) -> bool {
        self.hash.matches(data)
    }
}

impl Ord for Cid {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.codec, &self.hash).cmp(&(other.codec, &other.hash))
    }
}

impl PartialOrd for Cid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<Vec<u8>> for Cid {
    type Error = TypesError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(&bytes)
    }
}

impl From<Cid> for Vec<u8> {
    fn from(cid: Cid) -> Self {
        cid.to_bytes()
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Version-1 CIDs print as base32 lower.
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl FromStr for Cid {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, bytes) =
            multibase::decode(s).map_err(|_| TypesError::InvalidCid("invalid multibase"))?;
        if base != Base::Base32Lower {
            return Err(TypesError::InvalidCid("expected base32 multibase prefix 'b'"));
        }
        Self::from_bytes(&bytes)
    }
}
