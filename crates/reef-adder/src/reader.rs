//! Reading added files and directories back out of a block store.

use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use reef_dag::{DagLink, DecodedNode, Position, UnixFsType, decode_node, locate};
use reef_store::BlockStore;
use reef_types::{Cid, Codec};

use crate::error::ReadError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read the whole content of the file rooted at `cid`.
pub async fn read_file(store: &dyn BlockStore, cid: &Cid) -> Result<Bytes, ReadError> {
    read_range(store, cid, 0, u64::MAX).await
}

/// Read up to `len` bytes of the file rooted at `cid`, starting at `offset`.
///
/// Only the blocks covering the range are fetched. Reading past the end
/// returns fewer bytes, or none.
pub async fn read_range(
    store: &dyn BlockStore,
    cid: &Cid,
    offset: u64,
    len: u64,
) -> Result<Bytes, ReadError> {
    let end = offset.saturating_add(len);
    let mut out = BytesMut::new();
    read_into(store, cid, offset, end, &mut out).await?;
    Ok(out.freeze())
}

/// The entries of the directory rooted at `cid`, in stored order.
pub async fn list_directory(store: &dyn BlockStore, cid: &Cid) -> Result<Vec<DagLink>, ReadError> {
    if cid.codec() != Codec::DagPb {
        return Err(ReadError::NotADirectory(cid.clone()));
    }
    let node = fetch_node(store, cid).await?;
    if node.unixfs.kind != UnixFsType::Directory {
        return Err(ReadError::NotADirectory(cid.clone()));
    }
    Ok(node.links)
}

async fn fetch(store: &dyn BlockStore, cid: &Cid) -> Result<Bytes, ReadError> {
    if cid.hash().is_identity() {
        return Ok(Bytes::copy_from_slice(cid.hash().digest_bytes()));
    }
    match store.get(cid).await? {
        Some(block) => Ok(block.into_parts().1),
        None => Err(ReadError::NotFound(cid.clone())),
    }
}

async fn fetch_node(store: &dyn BlockStore, cid: &Cid) -> Result<DecodedNode, ReadError> {
    let data = fetch(store, cid).await?;
    Ok(decode_node(&data)?)
}

/// Append file bytes `[offset, end)` of the DAG under `cid` to `out`.
fn read_into<'a>(
    store: &'a dyn BlockStore,
    cid: &'a Cid,
    offset: u64,
    end: u64,
    out: &'a mut BytesMut,
) -> BoxFuture<'a, Result<(), ReadError>> {
    Box::pin(async move {
        if cid.codec() == Codec::Raw {
            let data = fetch(store, cid).await?;
            out.extend_from_slice(slice(&data, offset, end));
            return Ok(());
        }

        let node = fetch_node(store, cid).await?;
        if node.unixfs.kind == UnixFsType::Directory {
            return Err(ReadError::NotAFile(cid.clone()));
        }

        let inline = node.unixfs.data.len() as u64;
        let first_child = match locate(&node, offset)? {
            Position::End => return Ok(()),
            Position::Inline(at) => {
                out.extend_from_slice(slice(&node.unixfs.data, at, end));
                0
            }
            Position::Child { index, .. } => index,
        };

        let mut start = inline + node.unixfs.blocksizes[..first_child].iter().sum::<u64>();
        let children = node.links.iter().zip(&node.unixfs.blocksizes).skip(first_child);
        for (link, &size) in children {
            if start >= end {
                break;
            }
            let child_end = (end - start).min(size);
            read_into(store, &link.cid, offset.saturating_sub(start), child_end, out).await?;
            start += size;
        }
        Ok(())
    })
}

fn slice(data: &[u8], offset: u64, end: u64) -> &[u8] {
    let len = data.len() as u64;
    let from = offset.min(len) as usize;
    let to = end.min(len) as usize;
    &data[from..to.max(from)]
}
