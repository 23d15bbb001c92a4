//! Integration test: the raw-block gateway over an added tree.
//!
//! Everything fetched over HTTP must hash to the identifier it was
//! requested by, so a client can rebuild the file from the gateway alone.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use reef_adder::AdderConfig;
use reef_dag::decode_node;
use reef_integration_tests::{TestRepo, test_data};
use reef_types::{Block, ChunkerConfig, Cid, Codec};
use tower::ServiceExt;

async fn fetch_raw(app: &axum::Router, cid: &Cid) -> (StatusCode, Bytes) {
    let request = Request::builder()
        .uri(format!("/ipfs/{cid}"))
        .header(header::ACCEPT, reef_gateway::RAW_BLOCK_TYPE)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

/// Rebuild a file by walking its DAG through the gateway.
#[tokio::test]
async fn test_rebuild_file_over_http() {
    let repo = TestRepo::on_disk();
    let data = test_data(50_000);
    let config = AdderConfig {
        raw_leaves: true,
        chunker: ChunkerConfig::FixedSize { size: 4096 },
        ..AdderConfig::default()
    };
    let root = repo.add_bytes(config, "f", &data).await;
    let app = repo.gateway();

    let mut rebuilt = Vec::new();
    let mut pending = vec![root];
    while let Some(cid) = pending.pop() {
        let (status, body) = fetch_raw(&app, &cid).await;
        assert_eq!(status, StatusCode::OK, "{cid}");
        assert!(Block::new(cid.clone(), body.clone()).verify(), "{cid}");

        match cid.codec() {
            Codec::Raw => rebuilt.extend_from_slice(&body),
            Codec::DagPb => {
                let node = decode_node(&body).unwrap();
                rebuilt.extend_from_slice(&node.unixfs.data);
                // Depth-first, left to right.
                pending.extend(node.links.into_iter().rev().map(|link| link.cid));
            }
        }
    }
    assert_eq!(rebuilt, data);
}

/// A second request with the returned ETag is answered without a body.
#[tokio::test]
async fn test_conditional_request() {
    let repo = TestRepo::memory();
    let root = repo
        .add_bytes(AdderConfig::default(), "f", b"conditional")
        .await;
    let app = repo.gateway();

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/ipfs/{root}?format=raw"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let etag = first.headers()[header::ETAG].clone();

    let second = app
        .oneshot(
            Request::builder()
                .uri(format!("/ipfs/{root}?format=raw"))
                .header(header::IF_NONE_MATCH, etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
}

/// Blocks of a different repository are not found.
#[tokio::test]
async fn test_foreign_block_not_found() {
    let ours = TestRepo::memory();
    let theirs = TestRepo::memory();
    let cid = theirs
        .add_bytes(AdderConfig::default(), "f", b"elsewhere")
        .await;

    let (status, _) = fetch_raw(&ours.gateway(), &cid).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
