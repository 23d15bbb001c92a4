//! Read-only HTTP gateway for Reef.
//!
//! Provides a [`Gateway`] exposing stored blocks over an axum router:
//!
//! - `GET /ipfs/{cid}?format=raw`: the block bytes as
//!   `application/vnd.ipld.raw` (also selected with an `Accept` header)
//!
//! Responses carry an `ETag` of `"{cid}.raw"`, and a matching
//! `If-None-Match` returns `304 Not Modified`. The gateway never writes.

mod error;
mod handlers;


use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use reef_store::BlockStore;

pub use error::GatewayError;
pub use handlers::RAW_BLOCK_TYPE;

/// Shared application state for all gateway handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Where blocks are read from.
    pub blocks: Arc<dyn BlockStore>,
}

/// Raw-block HTTP gateway backed by a [`BlockStore`].
pub struct Gateway {
    router: Router,
}

impl Gateway {
    /// Create a gateway serving blocks from `blocks`.
    pub fn new(blocks: Arc<dyn BlockStore>) -> Self {
        let state = AppState { blocks };
        let router = Router::new()
            .route("/ipfs/{cid}", get(handlers::get_block))
            .with_state(state);
        Self { router }
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "gateway listening");
        axum::serve(listener, self.router).await
    }

    /// Serve until `shutdown` completes, then let in-flight requests finish.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "gateway listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
