//! Push-style balance invalidation over a websocket account subscription.
//!
//! # Data Flow
//! ```text
//! connect ws_url → accountSubscribe(address)
//!     → each accountNotification → BalanceTracker::invalidate()
//!     → connection lost → jittered backoff → reconnect
//! ```
//!
//! Notifications only wake the poll loop; the balance itself always comes
//! from a regular `getBalance` so both paths agree on commitment.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::balance::tracker::BalanceTracker;
use crate::keys::Address;
use crate::ledger::Commitment;
use crate::resilience::retry_delay;

/// Handle to a running subscription task.
pub struct AccountSubscription {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl AccountSubscription {
    pub fn spawn(
        ws_url: Url,
        address: Address,
        commitment: Commitment,
        tracker: Weak<BalanceTracker>,
        reconnect_base: Duration,
        reconnect_max: Duration,
    ) -> Self {
        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run(
            ws_url,
            address,
            commitment,
            tracker,
            reconnect_base,
            reconnect_max,
            stop_rx,
        ));
        Self { stop, handle }
    }

    /// Stop the subscription and wait for its task to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Account subscription task ended abnormally");
        }
    }
}

/// Why one connection ended.
enum Disconnect {
    Stopped,
    TrackerGone,
    Lost(String),
}

async fn run(
    ws_url: Url,
    address: Address,
    commitment: Commitment,
    tracker: Weak<BalanceTracker>,
    reconnect_base: Duration,
    reconnect_max: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut attempt: u32 = 0;

    loop {
        match connect_once(&ws_url, &address, commitment, &tracker, &mut stop, &mut attempt).await {
            Disconnect::Stopped => break,
            Disconnect::TrackerGone => {
                tracing::debug!(address = %address, "Tracker dropped, ending account subscription");
                break;
            }
            Disconnect::Lost(reason) => {
                attempt = attempt.saturating_add(1);
                let delay = retry_delay(
                    attempt,
                    reconnect_base.as_millis() as u64,
                    reconnect_max.as_millis() as u64,
                );
                tracing::warn!(
                    url = %ws_url,
                    reason = %reason,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Account subscription lost, reconnecting"
                );
                tokio::select! {
                    biased;
                    _ = &mut stop => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn connect_once(
    ws_url: &Url,
    address: &Address,
    commitment: Commitment,
    tracker: &Weak<BalanceTracker>,
    stop: &mut oneshot::Receiver<()>,
    attempt: &mut u32,
) -> Disconnect {
    let connect = tokio::select! {
        biased;
        _ = &mut *stop => return Disconnect::Stopped,
        result = connect_async(ws_url.as_str()) => result,
    };
    let (ws, _) = match connect {
        Ok(conn) => conn,
        Err(e) => return Disconnect::Lost(e.to_string()),
    };
    let (mut write, mut read) = ws.split();

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "accountSubscribe",
        "params": [address.to_string(), { "encoding": "base64", "commitment": commitment }],
    });
    if let Err(e) = write.send(Message::text(request.to_string())).await {
        return Disconnect::Lost(e.to_string());
    }

    tracing::info!(url = %ws_url, address = %address, "Account subscription connected");

    loop {
        let frame = tokio::select! {
            biased;
            _ = &mut *stop => {
                let _ = write.send(Message::Close(None)).await;
                return Disconnect::Stopped;
            }
            frame = read.next() => frame,
        };

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Disconnect::Lost(e.to_string()),
            None => return Disconnect::Lost("stream closed".to_string()),
        };

        match message {
            Message::Text(text) => match classify(text.as_str()) {
                Frame::Subscribed(id) => {
                    *attempt = 0;
                    tracing::debug!(subscription = id, "Account subscription confirmed");
                }
                Frame::Notification => {
                    let Some(tracker) = tracker.upgrade() else {
                        return Disconnect::TrackerGone;
                    };
                    tracker.invalidate();
                }
                Frame::Error(reason) => return Disconnect::Lost(reason),
                Frame::Other => {}
            },
            Message::Ping(payload) => {
                if let Err(e) = write.send(Message::Pong(payload)).await {
                    return Disconnect::Lost(e.to_string());
                }
            }
            Message::Close(_) => return Disconnect::Lost("server closed connection".to_string()),
            _ => {}
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Subscribed(u64),
    Notification,
    Error(String),
    Other,
}

fn classify(text: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Frame::Other;
    };
    if value.get("method").and_then(Value::as_str) == Some("accountNotification") {
        return Frame::Notification;
    }
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("subscription refused");
        return Frame::Error(message.to_string());
    }
    match value.get("result").and_then(Value::as_u64) {
        Some(id) => Frame::Subscribed(id),
        None => Frame::Other,
    }
}
