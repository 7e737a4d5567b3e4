//! Exchange-route quoting.
//!
//! # Data Flow
//! ```text
//! Building:      quote(request) → check_slippage(quote, tolerance)
//! FeeConfirmed:  quote(request) again → check against Building-time output
//!                → prepare(quote, payer) → unsigned transaction bytes
//! ```
//!
//! The route-finding itself belongs to the external service; this module
//! only fetches quotes and guards the amounts.

pub mod http;
pub mod types;

pub use http::HttpQuoter;
pub use types::{ExchangeRequest, PreparedExchange, QuoteError, QuoteResult, RouteQuote};

use async_trait::async_trait;

use crate::keys::Address;

/// External quoting collaborator.
#[async_trait]
pub trait ExchangeQuoter: Send + Sync {
    /// Fetch a routed quote.
    async fn quote(&self, request: &ExchangeRequest) -> QuoteResult<RouteQuote>;

    /// Fetch the unsigned transaction executing `quote` with `payer` as fee payer.
    async fn prepare(&self, quote: &RouteQuote, payer: &Address) -> QuoteResult<PreparedExchange>;
}

/// Smallest output acceptable for `expected` under a `slippage_bps` tolerance.
pub fn min_acceptable_out(expected: u64, slippage_bps: u16) -> u64 {
    let bps = u128::from(slippage_bps.min(10_000));
    (u128::from(expected) * (10_000 - bps) / 10_000) as u64
}

/// Reject a quote whose guaranteed output falls outside the tolerance.
pub fn check_slippage(quote: &RouteQuote, slippage_bps: u16) -> QuoteResult<()> {
    let minimum = min_acceptable_out(quote.out_amount, slippage_bps);
    if quote.min_out_amount < minimum {
        return Err(QuoteError::SlippageExceeded {
            minimum,
            quoted: quote.min_out_amount,
        });
    }
    Ok(())
}

/// Reject a fresh quote whose expected output fell below the original tolerance.
pub fn check_requote(original: &RouteQuote, fresh: &RouteQuote, slippage_bps: u16) -> QuoteResult<()> {
    let minimum = min_acceptable_out(original.out_amount, slippage_bps);
    if fresh.out_amount < minimum {
        return Err(QuoteError::SlippageExceeded {
            minimum,
            quoted: fresh.out_amount,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn quote(out: u64, min_out: u64) -> RouteQuote {
        RouteQuote {
            input_mint: "So11111111111111111111111111111111111111112".into(),
            output_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into(),
            in_amount: 1_000_000_000,
            out_amount: out,
            min_out_amount: min_out,
            slippage_bps: 50,
            price_impact_pct: None,
            route: vec![],
            raw: Value::Null,
        }
    }

    #[test]
    fn test_min_acceptable_out() {
        assert_eq!(min_acceptable_out(10_000, 50), 9_950);
        assert_eq!(min_acceptable_out(10_000, 0), 10_000);
        assert_eq!(min_acceptable_out(u64::MAX, 1), (u128::from(u64::MAX) * 9_999 / 10_000) as u64);
        assert_eq!(min_acceptable_out(10_000, 20_000), 0);
    }

    #[test]
    fn test_check_slippage() {
        assert!(check_slippage(&quote(10_000, 9_950), 50).is_ok());
        assert_eq!(
            check_slippage(&quote(10_000, 9_000), 50).unwrap_err(),
            QuoteError::SlippageExceeded {
                minimum: 9_950,
                quoted: 9_000
            }
        );
    }

    #[test]
    fn test_check_requote() {
        let original = quote(10_000, 9_950);
        assert!(check_requote(&original, &quote(9_960, 9_910), 50).is_ok());
        assert!(check_requote(&original, &quote(9_900, 9_850), 50).is_err());
    }
}
