//! Transport-level error types.

use chainreduce_core::ReduceError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to a Steem node.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, bad status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The node answered, but not with what was asked for.
    #[error("{0}")]
    Unexpected(String),
}

impl RpcError {
    /// Returns `true` if this error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { ms: timeout_ms }
        } else if err.is_decode() {
            Self::Unexpected(format!("invalid response body: {err}"))
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<RpcError> for ReduceError {
    fn from(err: RpcError) -> Self {
        ReduceError::Source(err.to_string())
    }
}
