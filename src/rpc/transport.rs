//! HTTP JSON-RPC transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

use super::{RpcError, RpcResult};

/// One JSON-RPC request against one endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Call `method` on `url` and return the `result` member of the response.
    async fn call(&self, url: &Url, method: &str, params: Value, timeout: Duration)
        -> RpcResult<Value>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(
        &self,
        url: &Url,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                RpcError::Timeout(timeout)
            } else {
                RpcError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(classify)?;

        let json: Value = match serde_json::from_slice(&bytes) {
            Ok(json) => json,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Transport(format!("HTTP status {}", status)));
            }
            Err(e) => return Err(RpcError::InvalidResponse(e.to_string())),
        };

        parse_envelope(json, status.is_success())
    }
}

/// Unpack a JSON-RPC response envelope.
pub(crate) fn parse_envelope(json: Value, http_ok: bool) -> RpcResult<Value> {
    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(RpcError::Server { code, message });
    }

    if !http_ok {
        return Err(RpcError::Transport("non-success HTTP status".to_string()));
    }

    json.get("result")
        .cloned()
        .ok_or_else(|| RpcError::InvalidResponse("missing 'result' field".to_string()))
}
