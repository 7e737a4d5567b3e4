//! Endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single ledger-access endpoint
//! - Track latency, last success and consecutive failures
//! - Track remaining backoff (selections to sit out)

use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

const UNMEASURED: u64 = u64::MAX;
const NEVER: u64 = 0;

/// A single endpoint and its health metadata.
#[derive(Debug)]
pub struct Endpoint {
    /// Identifier for logging/metrics.
    pub name: String,
    /// JSON-RPC URL.
    pub url: Url,
    /// Websocket URL for account subscriptions.
    pub ws_url: Option<Url>,
    /// Position in the configured list; final tie-break.
    pub index: usize,

    last_latency_ms: AtomicU64,
    last_success_at_ms: AtomicU64,
    consecutive_failures: AtomicU32,
    skip_remaining: AtomicU32,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: Url, ws_url: Option<Url>, index: usize) -> Self {
        Self {
            name: name.into(),
            url,
            ws_url,
            index,
            last_latency_ms: AtomicU64::new(UNMEASURED),
            last_success_at_ms: AtomicU64::new(NEVER),
            consecutive_failures: AtomicU32::new(0),
            skip_remaining: AtomicU32::new(0),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Latency of the last successful call, if any.
    pub fn last_latency(&self) -> Option<Duration> {
        match self.last_latency_ms.load(Ordering::Relaxed) {
            UNMEASURED => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn last_success_at(&self) -> Option<SystemTime> {
        match self.last_success_at_ms.load(Ordering::Relaxed) {
            NEVER => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Selections still to sit out.
    pub fn skip_remaining(&self) -> u32 {
        self.skip_remaining.load(Ordering::Acquire)
    }

    pub fn is_backing_off(&self) -> bool {
        self.skip_remaining() > 0
    }

    /// Latency sort key; unmeasured sorts after any measurement.
    pub(crate) fn latency_key(&self) -> u64 {
        self.last_latency_ms.load(Ordering::Relaxed)
    }

    /// Report a successful call.
    pub fn mark_success(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(UNMEASURED - 1);
        self.last_latency_ms.store(ms, Ordering::Relaxed);
        self.last_success_at_ms.store(now_ms(), Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Release);
        self.skip_remaining.store(0, Ordering::Release);
    }

    /// Report a failed call. Returns the new consecutive failure count.
    pub fn mark_failure(&self, backoff: impl FnOnce(u32) -> u32) -> u32 {
        let failures = self
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);
        self.skip_remaining.store(backoff(failures), Ordering::Release);
        failures
    }

    /// Count one selection pass against the backoff. Returns true if the
    /// endpoint was eligible before this pass.
    pub(crate) fn consume_skip(&self) -> bool {
        self.skip_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_err()
    }

    pub fn status(&self) -> EndpointStatus {
        EndpointStatus {
            name: self.name.clone(),
            url: self.url.to_string(),
            consecutive_failures: self.consecutive_failures(),
            last_latency_ms: self.last_latency().map(|d| d.as_millis() as u64),
            last_success_at: self.last_success_at(),
            backing_off: self.is_backing_off(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(NEVER)
        .max(1)
}

/// Read-only view of an endpoint's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub name: String,
    pub url: String,
    pub consecutive_failures: u32,
    pub last_latency_ms: Option<u64>,
    pub last_success_at: Option<SystemTime>,
    pub backing_off: bool,
}
