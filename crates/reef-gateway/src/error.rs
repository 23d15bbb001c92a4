//! Gateway error types and their HTTP responses.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use reef_store::StoreError;
use reef_types::Cid;
use tracing::error;

/// Errors returned by gateway handlers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The path segment is not a valid identifier.
    #[error("invalid cid {input:?}: {reason}")]
    InvalidCid {
        /// The rejected path segment.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request asked for a response format other than a raw block.
    #[error("unsupported response format: {0}")]
    UnsupportedFormat(String),

    /// The block is not in the store.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// The requested byte range lies outside the block.
    #[error("range not satisfiable for a block of {size} bytes")]
    RangeNotSatisfiable {
        /// Length of the block in bytes.
        size: u64,
    },

    /// The block store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal server error.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal failure.
        message: String,
    },
}

impl GatewayError {
    /// Map to an HTTP status code.
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCid { .. } | Self::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "gateway request failed");
        }
        if let Self::RangeNotSatisfiable { size } = self {
            return (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{size}"))],
                format!("{self}\n"),
            )
                .into_response();
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{self}\n"),
        )
            .into_response()
    }
}
