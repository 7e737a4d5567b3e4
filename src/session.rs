//! Signed-in wallet session.
//!
//! # Lifecycle
//! ```text
//! open:  derive keypair → start balance tracker → initial refresh
//!        → (optional) account subscription → orchestrator bound to the key
//! close: stop accepting settlements → wait for an in-flight drive
//!        → stop subscription and tracker → discard the keypair
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::balance::{AccountSubscription, BalanceSnapshot, BalanceTracker};
use crate::config::{ValidationError, WalletConfig};
use crate::keys::{self, Address, KeyError, KeySlot};
use crate::ledger::LedgerClient;
use crate::quoting::{ExchangeQuoter, ExchangeRequest};
use crate::settlement::{
    FeeSchedule, PrimaryLeg, SettlementError, SettlementIntent, SettlementOrchestrator,
    SettlementRecord, SettlementResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("Session is closed")]
    Closed,
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

pub struct Session {
    signer: KeySlot,
    ledger: LedgerClient,
    tracker: Arc<BalanceTracker>,
    orchestrator: SettlementOrchestrator,
    fees: FeeSchedule,
    subscription: Mutex<Option<AccountSubscription>>,
    closed: AtomicBool,
}

impl Session {
    /// Open a session for a verified `identity`.
    pub async fn open(
        identity: &str,
        salt: &str,
        config: &WalletConfig,
        ledger: LedgerClient,
        quoter: Option<Arc<dyn ExchangeQuoter>>,
    ) -> SessionResult<Self> {
        let fees = FeeSchedule::from_config(&config.settlement)?;
        let signer = KeySlot::new(keys::derive(identity, salt)?);
        let address = signer.address();

        let tracker = BalanceTracker::new(ledger.clone());
        tracker.start(address, config.balance.poll_interval()).await;
        let initial = tracker.force_refresh().await;

        let subscription = if config.balance.push_invalidation {
            match ledger.pool().subscription_url() {
                Some(ws_url) => Some(AccountSubscription::spawn(
                    ws_url,
                    address,
                    config.rpc.read_commitment,
                    Arc::downgrade(&tracker),
                    Duration::from_millis(config.balance.reconnect_base_ms),
                    Duration::from_millis(config.balance.reconnect_max_ms),
                )),
                None => {
                    tracing::warn!("Push invalidation enabled but no endpoint has a websocket URL");
                    None
                }
            }
        } else {
            None
        };

        let orchestrator = SettlementOrchestrator::new(
            ledger.clone(),
            Arc::clone(&tracker),
            signer.clone(),
            quoter,
            config.settlement.clone(),
        );

        tracing::info!(
            address = %address,
            lamports = initial.lamports,
            live = initial.is_live(),
            push = subscription.is_some(),
            "Session opened"
        );

        Ok(Self {
            signer,
            ledger,
            tracker,
            orchestrator,
            fees,
            subscription: Mutex::new(subscription),
            closed: AtomicBool::new(false),
        })
    }

    /// Public address of the session key. Available after close.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn ledger(&self) -> &LedgerClient {
        &self.ledger
    }

    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn balance(&self) -> SessionResult<BalanceSnapshot> {
        self.ensure_open()?;
        Ok(self.tracker.current())
    }

    pub async fn refresh_balance(&self) -> SessionResult<BalanceSnapshot> {
        self.ensure_open()?;
        Ok(self.tracker.force_refresh().await)
    }

    /// Settle an explicit intent.
    pub async fn settle(&self, intent: SettlementIntent) -> SettlementResult<SettlementRecord> {
        self.orchestrator.execute(intent).await
    }

    /// Transfer `lamports` to `destination`, paying the scheduled fee.
    pub async fn transfer(&self, destination: Address, lamports: u64) -> SettlementResult<SettlementRecord> {
        let intent = self.fees.intent(PrimaryLeg::Transfer {
            destination,
            amount: lamports,
        });
        self.settle(intent).await
    }

    /// Exchange through the quoting service, paying the scheduled fee.
    pub async fn exchange(&self, request: ExchangeRequest) -> SettlementResult<SettlementRecord> {
        let intent = self.fees.intent(PrimaryLeg::Exchange(request));
        self.settle(intent).await
    }

    pub async fn recheck(&self, id: Uuid) -> SettlementResult<SettlementRecord> {
        self.orchestrator.recheck(id).await
    }

    pub fn abort(&self, id: Uuid) -> SettlementResult<()> {
        if self.is_closed() {
            return Err(SettlementError::SessionClosed);
        }
        self.orchestrator.abort(id)
    }

    pub fn dismiss(&self, id: Uuid) -> SettlementResult<SettlementRecord> {
        self.orchestrator.dismiss(id)
    }

    pub fn record(&self, id: Uuid) -> Option<SettlementRecord> {
        self.orchestrator.record(id)
    }

    pub fn records(&self) -> Vec<SettlementRecord> {
        self.orchestrator.records()
    }

    /// Close the session. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.orchestrator.shutdown().await;
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.stop().await;
        }
        self.tracker.stop().await;
        self.signer.discard();

        tracing::info!(address = %self.signer.address(), "Session closed");
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.signer.address())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, PoolConfig, RpcConfig};
    use crate::endpoints::EndpointPool;
    use crate::rpc::mock::MockTransport;
    use serde_json::json;

    fn config() -> WalletConfig {
        let mut config = WalletConfig::default();
        config.settlement.fee_destination = Address::new([9u8; 32]).to_string();
        config.balance.poll_interval_ms = 3_600_000;
        config
    }

    fn ledger(transport: Arc<MockTransport>) -> LedgerClient {
        let configs = vec![EndpointConfig {
            name: "a".into(),
            url: "https://a.example".into(),
            ws_url: None,
        }];
        let pool = Arc::new(EndpointPool::new(&configs, PoolConfig::default()).unwrap());
        let rpc = RpcConfig {
            request_timeout_ms: 200,
            ..RpcConfig::default()
        };
        LedgerClient::new(pool, transport, rpc)
    }

    fn balance_transport(lamports: u64) -> Arc<MockTransport> {
        Arc::new(MockTransport::new(move |_, _, _| Ok(json!({"value": lamports}))))
    }

    #[tokio::test]
    async fn test_same_identity_same_address() {
        let transport = balance_transport(1);
        let first = Session::open("user@example.com", "S", &config(), ledger(transport.clone()), None)
            .await
            .unwrap();
        first.close().await;
        let second = Session::open("user@example.com", "S", &config(), ledger(transport), None)
            .await
            .unwrap();

        assert_eq!(first.address(), second.address());
        second.close().await;
    }

    #[tokio::test]
    async fn test_open_refreshes_balance() {
        let session = Session::open("user@example.com", "S", &config(), ledger(balance_transport(42)), None)
            .await
            .unwrap();
        let balance = session.balance().unwrap();
        assert_eq!(balance.lamports, 42);
        assert!(balance.is_live());
        session.close().await;
    }

    #[tokio::test]
    async fn test_open_rejects_blank_identity() {
        let err = Session::open("  ", "S", &config(), ledger(balance_transport(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Key(KeyError::InvalidCredential(_))));
    }

    #[tokio::test]
    async fn test_open_requires_fee_destination() {
        let err = Session::open(
            "user@example.com",
            "S",
            &WalletConfig::default(),
            ledger(balance_transport(1)),
            None,
        )
        .await
        .unwrap_err();
        match err {
            SessionError::Config(e) => assert_eq!(e.field, "settlement.fee_destination"),
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_rejects_further_calls() {
        let transport = balance_transport(1_000_000_000);
        let session = Session::open("user@example.com", "S", &config(), ledger(transport.clone()), None)
            .await
            .unwrap();

        session.close().await;
        session.close().await;

        assert!(session.is_closed());
        assert!(session.signer.is_discarded());
        assert!(!session.tracker.is_running().await);
        assert_eq!(session.balance(), Err(SessionError::Closed));

        let err = session.transfer(Address::new([1u8; 32]), 5_000).await.unwrap_err();
        assert_eq!(err, SettlementError::SessionClosed);
        assert_eq!(session.abort(Uuid::new_v4()), Err(SettlementError::SessionClosed));
        assert_eq!(transport.count("sendTransaction"), 0);
    }

    #[tokio::test]
    async fn test_no_polls_after_close() {
        let transport = balance_transport(1);
        let mut config = config();
        config.balance.poll_interval_ms = 10;
        let session = Session::open("user@example.com", "S", &config, ledger(transport.clone()), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        session.close().await;
        let polls = transport.count("getBalance");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count("getBalance"), polls);
    }
}
