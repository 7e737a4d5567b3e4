//! Exchange quoting types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What the caller wants to exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Mint of the asset being sold.
    pub input_mint: String,
    /// Mint of the asset being bought.
    pub output_mint: String,
    /// Input amount in base units.
    pub amount: u64,
    /// Largest acceptable shortfall from the quoted output, in basis points.
    pub slippage_bps: u16,
}

/// A routed quote from the quoting service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteQuote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    /// Expected output in base units.
    pub out_amount: u64,
    /// Output the route guarantees after slippage.
    pub min_out_amount: u64,
    pub slippage_bps: u16,
    pub price_impact_pct: Option<String>,
    /// Venue labels along the route.
    pub route: Vec<String>,
    /// Service response, passed back verbatim when requesting the transaction.
    #[serde(skip)]
    pub raw: Value,
}

/// Unsigned transaction for a quoted route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedExchange {
    /// Serialized transaction; the fee payer's signature slot is empty.
    pub transaction: Vec<u8>,
    /// Block height after which the transaction can no longer land.
    pub last_valid_block_height: Option<u64>,
}

/// Errors from the quoting service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    /// Exchange settlements are not configured.
    #[error("Exchange quoting is disabled")]
    Disabled,

    /// Request could not reach the service.
    #[error("Quote request failed: {0}")]
    Http(String),

    /// The service answered but has no usable route.
    #[error("Quote rejected: {0}")]
    Rejected(String),

    #[error("Invalid quote response: {0}")]
    InvalidResponse(String),

    /// Quoted output is below what the slippage tolerance allows.
    #[error("Quoted output {quoted} is below minimum acceptable {minimum}")]
    SlippageExceeded { minimum: u64, quoted: u64 },

    /// Requested tolerance is above the configured ceiling.
    #[error("Slippage {requested}bps exceeds maximum {max}bps")]
    ToleranceTooHigh { requested: u16, max: u16 },
}

/// Result type for quoting operations.
pub type QuoteResult<T> = Result<T, QuoteError>;
