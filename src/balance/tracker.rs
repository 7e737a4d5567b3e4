//! Interval balance polling.
//!
//! # Responsibilities
//! - Poll the ledger for one address on an interval
//! - Publish the last-known-good balance (lock-free reads)
//! - Keep the previous value, marked stale, when a poll fails
//! - Accept out-of-band refresh requests
//!
//! # Design Decisions
//! - The poll task holds a `Weak` reference, so dropping the tracker ends it
//! - `stop` signals the task and awaits it; no poll runs after it returns
//! - Results are ordered by request sequence; a slow early request never
//!   overwrites a newer one

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::balance::snapshot::BalanceSnapshot;
use crate::keys::Address;
use crate::ledger::LedgerClient;
use crate::observability::metrics;

#[derive(Debug)]
struct Published {
    seq: u64,
    snapshot: BalanceSnapshot,
}

struct PollTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct BalanceTracker {
    ledger: LedgerClient,
    state: ArcSwap<Published>,
    next_seq: AtomicU64,
    address: Mutex<Option<Address>>,
    task: tokio::sync::Mutex<Option<PollTask>>,
    wake: Arc<Notify>,
}

impl BalanceTracker {
    pub fn new(ledger: LedgerClient) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            state: ArcSwap::from_pointee(Published {
                seq: 0,
                snapshot: BalanceSnapshot::unobserved(),
            }),
            next_seq: AtomicU64::new(0),
            address: Mutex::new(None),
            task: tokio::sync::Mutex::new(None),
            wake: Arc::new(Notify::new()),
        })
    }

    /// Start polling `address` every `period`. Restarts the loop if one is
    /// already running. The first poll happens immediately.
    pub async fn start(self: &Arc<Self>, address: Address, period: Duration) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            Self::shutdown(previous).await;
        }

        self.set_address(Some(address));
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(Self::run(
            Arc::downgrade(self),
            Arc::clone(&self.wake),
            address,
            period,
            stop_rx,
        ));
        *task = Some(PollTask {
            stop: stop_tx,
            handle,
        });

        tracing::info!(address = %address, interval_ms = period.as_millis() as u64, "Balance tracker started");
    }

    /// Stop polling. Idempotent; returns once the poll task has exited.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        self.set_address(None);
        if let Some(running) = task.take() {
            Self::shutdown(running).await;
            tracing::info!("Balance tracker stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// The last published snapshot.
    pub fn current(&self) -> BalanceSnapshot {
        self.state.load().snapshot
    }

    /// Poll now, outside the timer. Returns the resulting snapshot, or the
    /// current one if the tracker is not running.
    pub async fn force_refresh(&self) -> BalanceSnapshot {
        let address = *self.address.lock().unwrap_or_else(|p| p.into_inner());
        match address {
            Some(address) => self.poll(&address).await,
            None => self.current(),
        }
    }

    /// Ask the poll loop for an early poll. Used for push notifications.
    pub fn invalidate(&self) {
        self.wake.notify_one();
    }

    fn set_address(&self, address: Option<Address>) {
        *self.address.lock().unwrap_or_else(|p| p.into_inner()) = address;
    }

    async fn shutdown(task: PollTask) {
        let _ = task.stop.send(());
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "Balance poll task ended abnormally");
        }
    }

    async fn run(
        tracker: Weak<Self>,
        wake: Arc<Notify>,
        address: Address,
        period: Duration,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = ticker.tick() => {}
                _ = wake.notified() => {
                    tracing::debug!(address = %address, "Balance invalidated");
                }
            }

            let Some(tracker) = tracker.upgrade() else {
                break;
            };
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = tracker.poll(&address) => {}
            }
        }
    }

    async fn poll(&self, address: &Address) -> BalanceSnapshot {
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let result = self.ledger.get_balance(address).await;

        match &result {
            Ok(lamports) => {
                tracing::debug!(address = %address, lamports, "Balance updated");
            }
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Balance poll failed, keeping last known value");
            }
        }
        metrics::record_balance_poll(result.is_ok());

        self.apply(seq, result.ok())
    }

    fn apply(&self, seq: u64, lamports: Option<u64>) -> BalanceSnapshot {
        let now = SystemTime::now();
        self.state.rcu(|current| {
            if current.seq > seq {
                return Arc::clone(current);
            }
            let snapshot = match lamports {
                Some(lamports) => current.snapshot.succeeded(lamports, now),
                None => current.snapshot.failed(),
            };
            Arc::new(Published { seq, snapshot })
        });
        self.current()
    }
}

impl std::fmt::Debug for BalanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceTracker")
            .field("snapshot", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceSource;
    use crate::config::{EndpointConfig, PoolConfig, RpcConfig};
    use crate::endpoints::EndpointPool;
    use crate::rpc::mock::MockTransport;
    use crate::rpc::RpcError;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU64};

    struct Scripted {
        balance: Arc<AtomicU64>,
        failing: Arc<AtomicBool>,
        transport: Arc<MockTransport>,
    }

    fn scripted() -> (Scripted, LedgerClient) {
        let balance = Arc::new(AtomicU64::new(10_000_000));
        let failing = Arc::new(AtomicBool::new(false));
        let (b, f) = (balance.clone(), failing.clone());
        let transport = Arc::new(MockTransport::new(move |_, _, _| {
            if f.load(Ordering::SeqCst) {
                Err(RpcError::Transport("unreachable".into()))
            } else {
                Ok(json!({"value": b.load(Ordering::SeqCst)}))
            }
        }));
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
        let ledger = LedgerClient::new(pool, transport.clone(), RpcConfig::default());
        (
            Scripted {
                balance,
                failing,
                transport,
            },
            ledger,
        )
    }

    fn addr() -> Address {
        Address::new([1u8; 32])
    }

    #[tokio::test]
    async fn test_unobserved_before_start() {
        let (_, ledger) = scripted();
        let tracker = BalanceTracker::new(ledger);
        assert_eq!(tracker.current(), BalanceSnapshot::unobserved());
        assert_eq!(tracker.force_refresh().await, BalanceSnapshot::unobserved());
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_last_value() {
        let (script, ledger) = scripted();
        let tracker = BalanceTracker::new(ledger);
        tracker.start(addr(), Duration::from_secs(3600)).await;

        let live = tracker.force_refresh().await;
        assert_eq!(live.lamports, 10_000_000);
        assert_eq!(live.source, BalanceSource::Live);

        script.failing.store(true, Ordering::SeqCst);
        let stale = tracker.force_refresh().await;
        assert_eq!(stale.lamports, 10_000_000);
        assert_eq!(stale.source, BalanceSource::Stale);
        assert_eq!(stale.observed_at, live.observed_at);

        script.failing.store(false, Ordering::SeqCst);
        script.balance.store(42, Ordering::SeqCst);
        let recovered = tracker.force_refresh().await;
        assert_eq!(recovered.lamports, 42);
        assert!(recovered.is_live());
        assert!(recovered.observed_at >= live.observed_at);

        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_polls_on_interval_and_stop_is_final() {
        let (script, ledger) = scripted();
        let tracker = BalanceTracker::new(ledger);
        tracker.start(addr(), Duration::from_millis(10)).await;

        tokio::time::sleep(Duration::from_millis(55)).await;
        tracker.stop().await;
        tracker.stop().await;
        assert!(!tracker.is_running().await);

        let polls = script.transport.count("getBalance");
        assert!(polls >= 3, "expected interval polls, got {}", polls);

        tokio::time::sleep(Duration::from_millis(40)).await;
        tracker.force_refresh().await;
        assert_eq!(script.transport.count("getBalance"), polls);
    }

    #[tokio::test]
    async fn test_invalidate_triggers_early_poll() {
        let (script, ledger) = scripted();
        let tracker = BalanceTracker::new(ledger);
        tracker.start(addr(), Duration::from_secs(3600)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(script.transport.count("getBalance"), 1);

        tracker.invalidate();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(script.transport.count("getBalance"), 2);

        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_older_result_is_discarded() {
        let (_, ledger) = scripted();
        let tracker = BalanceTracker::new(ledger);
        tracker.apply(2, Some(500));
        tracker.apply(1, Some(100));
        tracker.apply(1, None);
        let snap = tracker.current();
        assert_eq!(snap.lamports, 500);
        assert!(snap.is_live());
    }
}
