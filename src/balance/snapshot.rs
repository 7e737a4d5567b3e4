//! Last-known balance.

use serde::Serialize;
use std::time::SystemTime;

/// Where the current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceSource {
    /// The most recent poll succeeded.
    Live,
    /// The most recent poll failed, or none has succeeded yet.
    Stale,
}

/// Balance as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// Lamports.
    pub lamports: u64,
    /// When the value was fetched. `None` until a poll succeeds.
    pub observed_at: Option<SystemTime>,
    pub source: BalanceSource,
}

impl BalanceSnapshot {
    /// Placeholder before the first successful poll.
    pub const fn unobserved() -> Self {
        Self {
            lamports: 0,
            observed_at: None,
            source: BalanceSource::Stale,
        }
    }

    pub fn is_live(&self) -> bool {
        self.source == BalanceSource::Live
    }

    /// A fresh live value. `observed_at` never moves backwards relative to `self`.
    pub fn succeeded(&self, lamports: u64, now: SystemTime) -> Self {
        let observed_at = match self.observed_at {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        Self {
            lamports,
            observed_at: Some(observed_at),
            source: BalanceSource::Live,
        }
    }

    /// The same value, marked stale.
    pub fn failed(&self) -> Self {
        Self {
            source: BalanceSource::Stale,
            ..*self
        }
    }
}

impl Default for BalanceSnapshot {
    fn default() -> Self {
        Self::unobserved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failure_keeps_value() {
        let now = SystemTime::now();
        let live = BalanceSnapshot::unobserved().succeeded(10_000_000, now);
        let stale = live.failed();
        assert_eq!(stale.lamports, 10_000_000);
        assert_eq!(stale.observed_at, Some(now));
        assert_eq!(stale.source, BalanceSource::Stale);
    }

    #[test]
    fn test_observed_at_never_regresses() {
        let later = SystemTime::now();
        let earlier = later - Duration::from_secs(5);
        let snap = BalanceSnapshot::unobserved().succeeded(1, later).succeeded(2, earlier);
        assert_eq!(snap.observed_at, Some(later));
        assert_eq!(snap.lamports, 2);
    }
}
