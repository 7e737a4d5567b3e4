//! Asset catalog and amount conversion.
//!
//! The catalog is informational; settlement only needs `decimals` to turn
//! a display amount into base units.

use serde::Serialize;
use thiserror::Error;

/// Mint identifier of the wrapped native asset, as used by exchange routes.
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Decimals of the native asset (lamports per unit = 10^9).
pub const NATIVE_DECIMALS: u8 = 9;

/// Display metadata for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    pub symbol: String,
    pub name: String,
    pub mint: String,
    pub decimals: u8,
}

/// Resolves asset identifiers to display metadata.
pub trait AssetCatalog: Send + Sync {
    /// Look up by symbol (case-insensitive) or mint.
    fn resolve(&self, symbol_or_mint: &str) -> Option<AssetInfo>;
}

const KNOWN_ASSETS: &[(&str, &str, &str, u8)] = &[
    ("SOL", "Solana", NATIVE_MINT, NATIVE_DECIMALS),
    ("USDC", "USD Coin", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6),
    ("USDT", "Tether USD", "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", 6),
    ("BONK", "Bonk", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", 5),
    ("JUP", "Jupiter", "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", 6),
    ("MSOL", "Marinade staked SOL", "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", 9),
];

/// Catalog of well-known assets compiled into the binary.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    assets: Vec<AssetInfo>,
}

impl StaticCatalog {
    pub fn new(assets: Vec<AssetInfo>) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &[AssetInfo] {
        &self.assets
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(
            KNOWN_ASSETS
                .iter()
                .map(|(symbol, name, mint, decimals)| AssetInfo {
                    symbol: symbol.to_string(),
                    name: name.to_string(),
                    mint: mint.to_string(),
                    decimals: *decimals,
                })
                .collect(),
        )
    }
}

impl AssetCatalog for StaticCatalog {
    fn resolve(&self, symbol_or_mint: &str) -> Option<AssetInfo> {
        let needle = symbol_or_mint.trim();
        self.assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(needle) || a.mint == needle)
            .cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid amount '{0}'")]
    Invalid(String),

    #[error("Too many decimal places (max {0})")]
    TooPrecise(u8),

    #[error("Amount out of range")]
    Overflow,
}

/// Parse a display amount such as `"1.5"` into base units.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<u64, AmountError> {
    let amount = amount.trim();
    let invalid = || AmountError::Invalid(amount.to_string());

    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(AmountError::TooPrecise(decimals));
    }

    let scale = 10u64.checked_pow(decimals as u32).ok_or(AmountError::Overflow)?;
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| AmountError::Overflow)?
    };
    let frac_units: u64 = if frac.is_empty() {
        0
    } else {
        let digits: u64 = frac.parse().map_err(|_| invalid())?;
        digits * 10u64.pow((decimals as usize - frac.len()) as u32)
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or(AmountError::Overflow)
}

/// Render base units for display, trimming trailing zeros.
pub fn format_base_units(units: u64, decimals: u8) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let Some(scale) = 10u64.checked_pow(decimals as u32) else {
        return units.to_string();
    };
    let whole = units / scale;
    let frac = units % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
