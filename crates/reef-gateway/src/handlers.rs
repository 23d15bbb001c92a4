//! Gateway request handlers.

use std::collections::BTreeMap;
use std::ops::Range;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use reef_types::Cid;
use tracing::debug;

use crate::AppState;
use crate::error::GatewayError;

/// Media type of a raw block response.
pub const RAW_BLOCK_TYPE: &str = "application/vnd.ipld.raw";

/// Blocks are immutable, so clients may cache them for as long as they like.
const IMMUTABLE_CACHE: &str = "public, max-age=29030400, immutable";

// -----------------------------------------------------------------------
// GET /ipfs/{cid}: raw block
// -----------------------------------------------------------------------

/// Serve the bytes of one block.
///
/// The caller must ask for a raw block, either with `?format=raw` or with
/// `Accept: application/vnd.ipld.raw`. A single `Range: bytes=...` is
/// answered with `206 Partial Content`; multiple or malformed ranges get the
/// whole block.
#[tracing::instrument(skip(state, params, headers))]
pub(crate) async fn get_block(
    State(state): State<AppState>,
    Path(cid): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let cid: Cid = cid.parse().map_err(|e: reef_types::TypesError| GatewayError::InvalidCid {
        input: cid.clone(),
        reason: e.to_string(),
    })?;
    check_raw_requested(&params, &headers)?;

    let block = state
        .blocks
        .get(&cid)
        .await?
        .ok_or_else(|| GatewayError::NotFound(cid.clone()))?;

    let etag = format!("\"{cid}.raw\"");
    if if_none_match(&headers, &etag) {
        debug!(%cid, "block not modified");
        return Ok(Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, &etag)
            .header(header::CACHE_CONTROL, IMMUTABLE_CACHE)
            .body(Body::empty())
            .map_err(internal)?);
    }

    let len = block.len() as u64;
    let (_, data) = block.into_parts();
    let builder = Response::builder()
        .header(header::CONTENT_TYPE, RAW_BLOCK_TYPE)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{cid}.bin\""),
        )
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::CACHE_CONTROL, IMMUTABLE_CACHE)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::ETAG, &etag);

    let response = match requested_range(&headers, len).unwrap_or(ByteRange::Whole) {
        ByteRange::Whole => {
            debug!(%cid, size = len, "serving raw block");
            builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, len)
                .body(Body::from(data))
        }
        ByteRange::Partial(range) => {
            debug!(%cid, start = range.start, end = range.end, "serving block range");
            let body = data.slice(range.start as usize..range.end as usize);
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{len}", range.start, range.end - 1),
                )
                .header(header::CONTENT_LENGTH, body.len())
                .body(Body::from(body))
        }
        ByteRange::Unsatisfiable => return Err(GatewayError::RangeNotSatisfiable { size: len }),
    };
    response.map_err(internal)
}

fn internal(e: axum::http::Error) -> GatewayError {
    GatewayError::Internal {
        message: e.to_string(),
    }
}

fn check_raw_requested(
    params: &BTreeMap<String, String>,
    headers: &HeaderMap,
) -> Result<(), GatewayError> {
    if let Some(format) = params.get("format") {
        return match format.as_str() {
            "raw" => Ok(()),
            other => Err(GatewayError::UnsupportedFormat(other.to_string())),
        };
    }

    let accepts_raw = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|media| media.split(';').next().is_some_and(|m| m.trim() == RAW_BLOCK_TYPE));
    if accepts_raw {
        Ok(())
    } else {
        Err(GatewayError::UnsupportedFormat(
            "only raw blocks are served; use ?format=raw".to_string(),
        ))
    }
}

/// Whether `If-None-Match` lists `etag` (weak or strong) or `*`.
fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v: &HeaderValue| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|tag| tag == "*" || tag.strip_prefix("W/").unwrap_or(tag) == etag)
}

/// What a `Range` header selects from a block.
#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Whole,
    Partial(Range<u64>),
    Unsatisfiable,
}

/// The single byte range asked for by `Range`, clamped to a block of `len`
/// bytes.
///
/// `None` means serve the whole block: no header, a unit other than bytes,
/// several ranges, or a malformed one.
fn requested_range(headers: &HeaderMap, len: u64) -> Option<ByteRange> {
    let spec = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = spec.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (first, last) = spec.split_once('-')?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // Suffix range: the last `n` bytes.
        let n: u64 = last.parse().ok()?;
        if n == 0 || len == 0 {
            return Some(ByteRange::Unsatisfiable);
        }
        return Some(ByteRange::Partial(len.saturating_sub(n)..len));
    }

    let start: u64 = first.parse().ok()?;
    let end = if last.is_empty() {
        len
    } else {
        let last: u64 = last.parse().ok()?;
        if last < start {
            return None;
        }
        last.saturating_add(1).min(len)
    };
    if start >= len {
        return Some(ByteRange::Unsatisfiable);
    }
    Some(ByteRange::Partial(start..end))
}
