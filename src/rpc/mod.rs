//! JSON-RPC transport.
//!
//! # Responsibilities
//! - Send a single JSON-RPC 2.0 request to one endpoint URL
//! - Classify failures: endpoint misbehaviour vs. request refused by the ledger
//!
//! Endpoint selection, failover and retries live above this layer
//! (`endpoints` and `ledger`).

#[cfg(test)]
pub(crate) mod mock;
pub mod transport;

pub use transport::{HttpTransport, RpcTransport};

use std::time::Duration;
use thiserror::Error;

/// Errors from a single JSON-RPC exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Connection failure or non-success HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the request deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with something that is not a usable JSON-RPC response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The endpoint answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Server { code: i64, message: String },
}

impl RpcError {
    /// True when the endpoint itself failed, as opposed to refusing the request.
    pub fn is_endpoint_failure(&self) -> bool {
        !matches!(self, RpcError::Server { .. })
    }
}

/// Result type for transport calls.
pub type RpcResult<T> = Result<T, RpcError>;
