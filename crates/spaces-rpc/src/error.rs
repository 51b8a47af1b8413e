//! RPC error types.

use thiserror::Error;

use spaces_core::error::IndexerError;

use crate::request::JsonRpcError;

/// Errors raised while talking to a JSON-RPC endpoint.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, timeout, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered with a JSON-RPC error object.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The result could not be decoded into the expected shape.
    #[error("unexpected {method} response: {reason}")]
    UnexpectedResponse { method: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl RpcError {
    /// Returns `true` if the failure is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl From<RpcError> for IndexerError {
    fn from(e: RpcError) -> Self {
        IndexerError::Fetch(e.to_string())
    }
}
