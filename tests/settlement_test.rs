//! End-to-end settlement through a session against a mock ledger over HTTP.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wallet_engine::config::{EndpointConfig, WalletConfig};
use wallet_engine::endpoints::EndpointPool;
use wallet_engine::keys::Address;
use wallet_engine::ledger::transaction::transfer_message;
use wallet_engine::ledger::{Blockhash, LedgerClient, Signature};
use wallet_engine::rpc::HttpTransport;
use wallet_engine::settlement::{AbortReason, LegFailure, SettlementError, SettlementOutcome, SettlementState};
use wallet_engine::Session;

mod common;
use common::Reply;

const BLOCKHASH: [u8; 32] = [3u8; 32];

fn fee_destination() -> Address {
    Address::new([9u8; 32])
}

fn config(addrs: &[SocketAddr]) -> WalletConfig {
    let mut config = WalletConfig::default();
    config.endpoints = addrs
        .iter()
        .enumerate()
        .map(|(i, addr)| EndpointConfig {
            name: format!("ep{}", i),
            url: common::url_for(*addr),
            ws_url: None,
        })
        .collect();
    config.rpc.request_timeout_ms = 500;
    config.rpc.confirm_poll_interval_ms = 10;
    config.balance.poll_interval_ms = 3_600_000;
    config.settlement.fee_destination = fee_destination().to_string();
    config.settlement.confirmation_timeout_ms = 2_000;
    config.settlement.retry_base_ms = 5;
    config.settlement.retry_max_ms = 20;
    config
}

async fn open(config: &WalletConfig) -> Session {
    let pool = Arc::new(EndpointPool::new(&config.endpoints, config.pool.clone()).unwrap());
    let ledger = LedgerClient::new(pool, Arc::new(HttpTransport::new()), config.rpc.clone());
    Session::open("user@example.com", "S", config, ledger, None).await.unwrap()
}

/// A ledger holding `balance`; `send` answers the n-th sendTransaction.
fn ledger_handler<S>(balance: u64, send: S) -> impl Fn(&str, &Value) -> Reply + Send + Sync + 'static
where
    S: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let sends = AtomicUsize::new(0);
    move |method: &str, _: &Value| match method {
        "getBalance" => Reply::Result(json!({"context": {"slot": 1}, "value": balance})),
        "getLatestBlockhash" => Reply::Result(json!({
            "context": {"slot": 1},
            "value": {"blockhash": Blockhash::new(BLOCKHASH).to_string(), "lastValidBlockHeight": 1_000}
        })),
        "getBlockHeight" => Reply::Result(json!(900)),
        "sendTransaction" => send(sends.fetch_add(1, Ordering::SeqCst)),
        "getSignatureStatuses" => Reply::Result(json!({
            "context": {"slot": 50},
            "value": [{"slot": 48, "confirmations": null, "confirmationStatus": "confirmed", "err": null}]
        })),
        _ => Reply::Error(-32601, "Method not found".into()),
    }
}

fn accepted(_: usize) -> Reply {
    Reply::Result(json!(Signature::new([7u8; 64]).to_string()))
}

fn sent_message(params: &Value) -> Vec<u8> {
    let tx = BASE64.decode(params[0].as_str().unwrap()).unwrap();
    tx[65..].to_vec()
}

#[tokio::test]
async fn test_transfer_settles_fee_then_primary() {
    let (addr, log) = common::start_rpc_backend(ledger_handler(2_000_000_000, accepted)).await;
    let config = config(&[addr]);
    let session = open(&config).await;
    let destination = Address::new([1u8; 32]);

    let record = session.transfer(destination, 100_000_000).await.unwrap();

    assert_eq!(record.state, SettlementState::PrimaryConfirmed);
    assert_eq!(record.outcome, SettlementOutcome::Completed);
    assert!(record.fee.confirmed_at.unwrap() < record.primary.submitted_at.unwrap());

    // 50 bps of 0.1 = 500_000 lamports.
    assert_eq!(record.intent.fee_amount, 500_000);
    let sent = log.params_of("sendTransaction");
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent_message(&sent[0]),
        transfer_message(&session.address(), &fee_destination(), 500_000, &Blockhash::new(BLOCKHASH))
    );
    assert_eq!(
        sent_message(&sent[1]),
        transfer_message(&session.address(), &destination, 100_000_000, &Blockhash::new(BLOCKHASH))
    );

    // The primary goes out only after a status check confirmed the fee.
    let methods = log.methods();
    let first_status = methods.iter().position(|m| m == "getSignatureStatuses").unwrap();
    let primary_send = methods.iter().rposition(|m| m == "sendTransaction").unwrap();
    assert!(first_status < primary_send);

    session.close().await;
}

#[tokio::test]
async fn test_primary_rejection_reports_fee_spent() {
    let handler = ledger_handler(2_000_000_000, |n| match n {
        1 => Reply::Error(-32002, "Transaction simulation failed: Error processing Instruction 0".into()),
        _ => accepted(n),
    });
    let (addr, log) = common::start_rpc_backend(handler).await;
    let config = config(&[addr]);
    let session = open(&config).await;

    let record = session.transfer(Address::new([1u8; 32]), 100_000_000).await.unwrap();

    assert_eq!(record.state, SettlementState::PrimaryFailed);
    assert!(record.fee_spent());
    assert!(matches!(
        record.outcome,
        SettlementOutcome::PartialFailure {
            failure: LegFailure::Rejected,
            ..
        }
    ));
    let err = record.error().unwrap();
    assert!(matches!(err, SettlementError::PartialSettlementFailure { .. }));
    assert!(err.to_string().contains("Fee was charged"));
    assert_eq!(log.count("sendTransaction"), 2);

    // The slot is free again.
    let next = session.transfer(Address::new([1u8; 32]), 1_000_000).await.unwrap();
    assert_eq!(next.outcome, SettlementOutcome::Completed);

    session.close().await;
}

#[tokio::test]
async fn test_insufficient_funds_never_broadcasts() {
    let (addr, log) = common::start_rpc_backend(ledger_handler(10_000_000, accepted)).await;
    let config = config(&[addr]);
    let session = open(&config).await;

    let record = session.transfer(Address::new([1u8; 32]), 10_000_000).await.unwrap();

    assert_eq!(record.state, SettlementState::Aborted);
    assert!(matches!(
        record.outcome,
        SettlementOutcome::Aborted(AbortReason::InsufficientFunds {
            available: 10_000_000,
            ..
        })
    ));
    assert_eq!(log.count("sendTransaction"), 0);
    assert_eq!(log.count("getLatestBlockhash"), 0);

    session.close().await;
}

#[tokio::test]
async fn test_settlement_survives_an_unavailable_endpoint() {
    let (down, _) = common::start_rpc_backend(|_, _| Reply::Status(503)).await;
    let (up, up_log) = common::start_rpc_backend(ledger_handler(2_000_000_000, accepted)).await;
    let config = config(&[down, up]);
    let session = open(&config).await;

    let record = session.transfer(Address::new([1u8; 32]), 100_000_000).await.unwrap();

    assert_eq!(record.outcome, SettlementOutcome::Completed);
    assert_eq!(up_log.count("sendTransaction"), 2);

    session.close().await;
}

#[tokio::test]
async fn test_closed_session_rejects_settlement() {
    let (addr, log) = common::start_rpc_backend(ledger_handler(2_000_000_000, accepted)).await;
    let config = config(&[addr]);
    let session = open(&config).await;

    session.close().await;
    let err = session.transfer(Address::new([1u8; 32]), 1_000).await.unwrap_err();

    assert_eq!(err, SettlementError::SessionClosed);
    assert_eq!(log.count("sendTransaction"), 0);
}
