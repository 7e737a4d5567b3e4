//! Scripted transport for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::{RpcResult, RpcTransport};

type Handler = dyn Fn(&str, &str, &Value) -> RpcResult<Value> + Send + Sync;

/// Answers every call through a closure of `(host, method, params)` and logs it.
pub(crate) struct MockTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, String, Value)>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl MockTransport {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &str, &Value) -> RpcResult<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }

    /// Hold every later call to `method` for `delay` before answering.
    pub(crate) fn delay(&self, method: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(method.to_string(), delay);
    }

    /// Every `(host, method)` seen so far, in order.
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(host, method, _)| (host.clone(), method.clone()))
            .collect()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m, _)| m == method)
            .count()
    }

    /// Params of every call to `method`.
    pub(crate) fn params_of(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m, _)| m == method)
            .map(|(_, _, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(
        &self,
        url: &Url,
        method: &str,
        params: Value,
        _timeout: Duration,
    ) -> RpcResult<Value> {
        let host = url.host_str().unwrap_or_default().to_string();
        self.calls
            .lock()
            .unwrap()
            .push((host.clone(), method.to_string(), params.clone()));
        let delay = self.delays.lock().unwrap().get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&host, method, &params)
    }
}
