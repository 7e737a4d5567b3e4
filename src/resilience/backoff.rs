//! Exponential backoff, in selections and in wall-clock time.

use rand::Rng;
use std::time::Duration;

/// Number of subsequent selections an endpoint is skipped for after
/// `failures` consecutive failures: `base * 2^(failures - 1)`, capped at `max`.
pub fn selection_backoff(failures: u32, base: u32, max: u32) -> u32 {
    if failures == 0 || base == 0 {
        return 0;
    }
    let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

/// Delay before retry `attempt` (1-based): exponential from `base_ms`,
/// capped at `max_ms`, plus up to 10% jitter.
pub fn retry_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
