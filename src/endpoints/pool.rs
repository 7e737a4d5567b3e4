//! Endpoint pool management.
//!
//! # Responsibilities
//! - Hold the configured candidate endpoints
//! - Rank and select an endpoint for each call
//! - Record call outcomes and apply selection backoff
//! - Probe every endpoint for liveness

use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::{EndpointConfig, PoolConfig};
use crate::endpoints::endpoint::{Endpoint, EndpointStatus};
use crate::endpoints::PoolError;
use crate::observability::metrics;
use crate::resilience::selection_backoff;
use crate::rpc::RpcTransport;

/// Liveness call used by probes.
pub const PROBE_METHOD: &str = "getBlockHeight";

/// Ranked set of interchangeable endpoints with shared health state.
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
    config: PoolConfig,
}

impl EndpointPool {
    /// Build a pool from configuration. Entries with unparseable URLs are skipped.
    pub fn new(configs: &[EndpointConfig], config: PoolConfig) -> Result<Self, PoolError> {
        let mut endpoints = Vec::with_capacity(configs.len());

        for cfg in configs {
            let url = match Url::parse(&cfg.url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(endpoint = %cfg.name, url = %cfg.url, error = %e, "Ignoring endpoint with invalid URL");
                    continue;
                }
            };
            let ws_url = cfg.ws_url.as_deref().and_then(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(endpoint = %cfg.name, ws_url = %raw, error = %e, "Ignoring invalid websocket URL");
                    None
                }
            });
            let index = endpoints.len();
            endpoints.push(Arc::new(Endpoint::new(cfg.name.clone(), url, ws_url, index)));
        }

        if endpoints.is_empty() {
            return Err(PoolError::NoEndpoints);
        }

        tracing::debug!(count = endpoints.len(), "Endpoint pool created");
        Ok(Self { endpoints, config })
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Pick the best endpoint. Always returns one.
    ///
    /// Eligible endpoints at or under the failure ceiling are ranked by
    /// consecutive failures, then latency, then list order. If none
    /// qualifies, the least-bad endpoint is returned instead.
    pub fn select_healthy(&self) -> Arc<Endpoint> {
        self.select_excluding(None)
    }

    /// As [`select_healthy`](Self::select_healthy), avoiding `exclude` unless
    /// it is the only endpoint or the only one at or under the failure ceiling.
    pub fn select_excluding(&self, exclude: Option<&Endpoint>) -> Arc<Endpoint> {
        let eligible: Vec<bool> = self.endpoints.iter().map(|ep| ep.consume_skip()).collect();
        let is_excluded = |ep: &Endpoint| exclude.map(|x| x.index == ep.index).unwrap_or(false);

        let healthy = self
            .endpoints
            .iter()
            .zip(&eligible)
            .filter(|(ep, ok)| **ok && !is_excluded(ep))
            .map(|(ep, _)| ep)
            .filter(|ep| ep.consecutive_failures() <= self.config.failure_ceiling)
            .min_by_key(|ep| (ep.consecutive_failures(), ep.latency_key(), ep.index));

        if let Some(ep) = healthy {
            return Arc::clone(ep);
        }

        // Retrying the excluded endpoint beats moving above the ceiling.
        let ceiling = self.config.failure_ceiling;
        if let Some(excluded) = exclude.and_then(|x| self.endpoints.get(x.index)) {
            let others_over_ceiling = self
                .endpoints
                .iter()
                .filter(|ep| !is_excluded(ep))
                .all(|ep| ep.consecutive_failures() > ceiling);
            if others_over_ceiling && excluded.consecutive_failures() <= ceiling {
                return Arc::clone(excluded);
            }
        }

        let least_bad = self
            .endpoints
            .iter()
            .filter(|ep| !is_excluded(ep))
            .min_by_key(|ep| {
                (
                    ep.consecutive_failures(),
                    ep.skip_remaining(),
                    ep.latency_key(),
                    ep.index,
                )
            });

        match least_bad {
            Some(ep) => {
                tracing::warn!(
                    endpoint = %ep.name,
                    failures = ep.consecutive_failures(),
                    "No healthy endpoint available, degrading to least-bad candidate"
                );
                Arc::clone(ep)
            }
            // Only the excluded endpoint exists.
            None => Arc::clone(&self.endpoints[exclude.map(|x| x.index).unwrap_or(0)]),
        }
    }

    /// Record the outcome of a call made against `endpoint`.
    pub fn report_outcome(&self, endpoint: &Endpoint, success: bool, latency: Duration) {
        if success {
            let recovered = endpoint.consecutive_failures() > 0;
            endpoint.mark_success(latency);
            if recovered {
                tracing::info!(endpoint = %endpoint.name, "Endpoint recovered");
            }
        } else {
            let failures = endpoint.mark_failure(|f| {
                selection_backoff(
                    f,
                    self.config.backoff_base_selections,
                    self.config.backoff_max_selections,
                )
            });
            metrics::record_endpoint_failure(&endpoint.name);
            tracing::warn!(
                endpoint = %endpoint.name,
                failures,
                skip = endpoint.skip_remaining(),
                "Endpoint call failed"
            );
        }
        metrics::record_endpoint_health(&endpoint.name, !endpoint.is_backing_off());
    }

    /// Issue a liveness call to every endpoint concurrently. Never fails;
    /// each result is recorded against its endpoint.
    pub async fn probe_all(&self, transport: &dyn RpcTransport, timeout: Duration) {
        let probes = self.endpoints.iter().map(|ep| async move {
            let start = Instant::now();
            let call = transport.call(&ep.url, PROBE_METHOD, json!([]), timeout);
            let healthy = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    tracing::debug!(endpoint = %ep.name, error = %e, "Probe failed");
                    false
                }
                Err(_) => {
                    tracing::debug!(endpoint = %ep.name, "Probe timed out");
                    false
                }
            };
            self.report_outcome(ep, healthy, start.elapsed());
        });

        join_all(probes).await;
    }

    /// Best-ranked endpoint that offers a websocket URL, without consuming backoff.
    pub fn subscription_url(&self) -> Option<Url> {
        self.endpoints
            .iter()
            .filter(|ep| ep.ws_url.is_some())
            .min_by_key(|ep| (ep.consecutive_failures(), ep.latency_key(), ep.index))
            .and_then(|ep| ep.ws_url.clone())
    }

    /// Health view of every endpoint, in configured order.
    pub fn snapshot(&self) -> Vec<EndpointStatus> {
        self.endpoints.iter().map(|ep| ep.status()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockTransport;
    use crate::rpc::RpcError;

    fn config(names: &[&str]) -> Vec<EndpointConfig> {
        names
            .iter()
            .map(|n| EndpointConfig {
                name: n.to_string(),
                url: format!("https://{}.example", n),
                ws_url: None,
            })
            .collect()
    }

    fn pool(names: &[&str]) -> EndpointPool {
        EndpointPool::new(&config(names), PoolConfig::default()).unwrap()
    }

    fn fail(pool: &EndpointPool, name: &str, times: u32) {
        let ep = pool.endpoints().iter().find(|e| e.name == name).unwrap().clone();
        for _ in 0..times {
            pool.report_outcome(&ep, false, Duration::ZERO);
        }
    }

    #[test]
    fn test_invalid_urls_skipped() {
        let mut cfgs = config(&["a"]);
        cfgs.push(EndpointConfig {
            name: "bad".into(),
            url: "not a url".into(),
            ws_url: None,
        });
        let pool = EndpointPool::new(&cfgs, PoolConfig::default()).unwrap();
        assert_eq!(pool.len(), 1);

        let err = EndpointPool::new(&cfgs[1..], PoolConfig::default()).unwrap_err();
        assert_eq!(err, PoolError::NoEndpoints);
    }

    #[test]
    fn test_list_order_breaks_ties() {
        let pool = pool(&["a", "b", "c"]);
        assert_eq!(pool.select_healthy().name, "a");
    }

    #[test]
    fn test_prefers_lower_latency() {
        let pool = pool(&["a", "b"]);
        pool.report_outcome(&pool.endpoints()[0], true, Duration::from_millis(200));
        pool.report_outcome(&pool.endpoints()[1], true, Duration::from_millis(20));
        assert_eq!(pool.select_healthy().name, "b");
    }

    #[test]
    fn test_unmeasured_after_measured() {
        let pool = pool(&["a", "b"]);
        pool.report_outcome(&pool.endpoints()[1], true, Duration::from_millis(900));
        assert_eq!(pool.select_healthy().name, "b");
    }

    #[test]
    fn test_healthy_beats_endpoint_over_ceiling() {
        let pool = pool(&["a", "b"]);
        fail(&pool, "b", 3);
        for _ in 0..20 {
            assert_eq!(pool.select_healthy().name, "a");
        }
    }

    #[test]
    fn test_three_failures_moves_selection() {
        let pool = pool(&["a", "b"]);
        assert_eq!(pool.select_healthy().name, "a");
        fail(&pool, "a", 3);
        assert_eq!(pool.select_healthy().name, "b");
    }

    #[test]
    fn test_backoff_is_temporary() {
        let pool = EndpointPool::new(
            &config(&["a", "b"]),
            PoolConfig {
                backoff_base_selections: 2,
                ..PoolConfig::default()
            },
        )
        .unwrap();
        fail(&pool, "a", 1);
        pool.report_outcome(&pool.endpoints()[1], true, Duration::from_millis(50));
        fail(&pool, "b", 1);

        // Both sit out two selections; degraded picks still return something.
        let _ = pool.select_healthy();
        let _ = pool.select_healthy();
        // Backoff spent. Failures tie and only b has a measured latency.
        assert_eq!(pool.select_healthy().name, "b");
        assert_eq!(pool.endpoints()[0].skip_remaining(), 0);
    }

    #[test]
    fn test_all_unhealthy_degrades() {
        let pool = pool(&["a", "b"]);
        fail(&pool, "a", 5);
        fail(&pool, "b", 4);
        assert_eq!(pool.select_healthy().name, "b");
    }

    #[test]
    fn test_select_excluding() {
        let pool = pool(&["a", "b"]);
        let first = pool.select_healthy();
        assert_eq!(pool.select_excluding(Some(&first)).name, "b");

        let single = self::pool(&["only"]);
        let ep = single.select_healthy();
        assert_eq!(single.select_excluding(Some(&ep)).name, "only");
    }

    #[test]
    fn test_retry_stays_under_ceiling() {
        let pool = pool(&["a", "b"]);
        fail(&pool, "b", 5);
        let first = pool.select_healthy();
        assert_eq!(first.name, "a");
        fail(&pool, "a", 1);

        let retry = pool.select_excluding(Some(&first));
        assert_eq!(retry.name, "a");
        assert_eq!(retry.consecutive_failures(), 1);

        // Once the excluded endpoint is also over the ceiling, the least-bad one wins.
        fail(&pool, "a", 6);
        assert_eq!(pool.select_excluding(Some(&first)).name, "b");
    }

    #[tokio::test]
    async fn test_probe_all_records_without_failing() {
        let pool = pool(&["a", "b"]);
        let transport = MockTransport::new(|host, _, _| {
            if host.starts_with("a.") {
                Err(RpcError::Transport("connection refused".into()))
            } else {
                Ok(json!(1234))
            }
        });

        for _ in 0..3 {
            pool.probe_all(&transport, Duration::from_millis(100)).await;
        }

        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0].consecutive_failures, 3);
        assert_eq!(snapshot[1].consecutive_failures, 0);
        assert!(snapshot[1].last_latency_ms.is_some());
        assert_eq!(transport.count(PROBE_METHOD), 6);
        assert_eq!(pool.select_healthy().name, "b");
    }

    #[test]
    fn test_subscription_url() {
        let mut cfgs = config(&["a", "b"]);
        cfgs[1].ws_url = Some("wss://b.example".into());
        let pool = EndpointPool::new(&cfgs, PoolConfig::default()).unwrap();
        assert_eq!(pool.subscription_url().unwrap().as_str(), "wss://b.example/");
    }
}
