//! Background endpoint probing.
//!
//! # Responsibilities
//! - Periodically probe every endpoint
//! - Stop on shutdown signal

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::endpoints::EndpointPool;
use crate::rpc::RpcTransport;

pub struct ProbeMonitor {
    pool: Arc<EndpointPool>,
    transport: Arc<dyn RpcTransport>,
    interval: Duration,
    timeout: Duration,
}

impl ProbeMonitor {
    pub fn new(
        pool: Arc<EndpointPool>,
        transport: Arc<dyn RpcTransport>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            transport,
            interval,
            timeout,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.interval.is_zero() {
            tracing::info!("Endpoint probing disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            endpoints = self.pool.len(),
            "Probe monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pool.probe_all(self.transport.as_ref(), self.timeout).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Probe monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, PoolConfig};
    use crate::rpc::mock::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn test_monitor_probes_until_shutdown() {
        let pool = Arc::new(
            EndpointPool::new(
                &[EndpointConfig {
                    name: "a".into(),
                    url: "https://a.example".into(),
                    ws_url: None,
                }],
                PoolConfig::default(),
            )
            .unwrap(),
        );
        let transport = Arc::new(MockTransport::new(|_, _, _| Ok(json!(1))));
        let (tx, rx) = broadcast::channel(1);

        let monitor = ProbeMonitor::new(
            pool.clone(),
            transport.clone(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        let handle = tokio::spawn(monitor.run(rx));

        tokio::time::sleep(Duration::from_millis(45)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let probes = transport.count("getBlockHeight");
        assert!(probes >= 2, "expected repeated probes, got {}", probes);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.count("getBlockHeight"), probes);
    }
}
