//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wallet engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ledger::types::Commitment;

/// Root configuration for the wallet engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Interchangeable ledger-access endpoints, in preference order.
    pub endpoints: Vec<EndpointConfig>,

    /// Endpoint selection and probing.
    pub pool: PoolConfig,

    /// Per-request RPC behaviour.
    pub rpc: RpcConfig,

    /// Balance polling.
    pub balance: BalanceConfig,

    /// Fee schedule and confirmation policy.
    pub settlement: SettlementConfig,

    /// Exchange-route quoting service.
    pub quoting: QuotingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Identity derivation.
    pub identity: IdentityConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![EndpointConfig {
                name: "mainnet-beta".to_string(),
                url: "https://api.mainnet-beta.solana.com".to_string(),
                ws_url: Some("wss://api.mainnet-beta.solana.com".to_string()),
            }],
            pool: PoolConfig::default(),
            rpc: RpcConfig::default(),
            balance: BalanceConfig::default(),
            settlement: SettlementConfig::default(),
            quoting: QuotingConfig::default(),
            observability: ObservabilityConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

/// A single ledger-access endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Identifier for logging/metrics.
    pub name: String,

    /// JSON-RPC URL (http or https).
    pub url: String,

    /// Optional websocket URL used for account subscriptions.
    #[serde(default)]
    pub ws_url: Option<String>,
}

/// Endpoint pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Endpoints with more consecutive failures than this are passed over
    /// whenever a healthier endpoint exists.
    pub failure_ceiling: u32,

    /// Selections skipped after the first failure.
    pub backoff_base_selections: u32,

    /// Upper bound on skipped selections.
    pub backoff_max_selections: u32,

    /// Background probe interval in seconds (0 disables the probe monitor).
    pub probe_interval_secs: u64,

    /// Liveness probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failure_ceiling: 3,
            backoff_base_selections: 1,
            backoff_max_selections: 8,
            probe_interval_secs: 30,
            probe_timeout_ms: 2_000,
        }
    }
}

impl PoolConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// RPC request configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Commitment used for balance and blockhash reads.
    pub read_commitment: Commitment,

    /// Interval between signature-status polls in milliseconds.
    pub confirm_poll_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            read_commitment: Commitment::Confirmed,
            confirm_poll_interval_ms: 1_000,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }
}

/// Balance tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Subscribe to account notifications and poll early when they arrive.
    pub push_invalidation: bool,

    /// Base reconnect delay for the account subscription in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    pub reconnect_max_ms: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 15_000,
            push_invalidation: false,
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

impl BalanceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settlement configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Platform fee in basis points of the primary amount.
    pub platform_fee_bps: u16,

    /// Minimum platform fee in lamports.
    pub min_fee_lamports: u64,

    /// Base58 address receiving the platform fee.
    pub fee_destination: String,

    /// Estimated network cost per transaction signature in lamports.
    pub network_fee_per_signature_lamports: u64,

    /// Ceiling for one confirmation wait in milliseconds.
    pub confirmation_timeout_ms: u64,

    /// Commitment a leg must reach to count as confirmed.
    pub confirmation_commitment: Commitment,

    /// Extra confirmation waits for the fee leg before reporting a timeout.
    pub fee_confirmation_repolls: u32,

    /// Attempts to build the primary transaction once the fee is confirmed.
    pub primary_build_attempts: u32,

    /// Base delay between settlement retries in milliseconds.
    pub retry_base_ms: u64,

    /// Maximum delay between settlement retries in milliseconds.
    pub retry_max_ms: u64,

    /// Slippage tolerance used when an exchange does not specify one.
    pub default_slippage_bps: u16,

    /// Largest slippage tolerance an exchange may request.
    pub max_slippage_bps: u16,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: 50,
            min_fee_lamports: 10_000,
            fee_destination: String::new(),
            network_fee_per_signature_lamports: 5_000,
            confirmation_timeout_ms: 60_000,
            confirmation_commitment: Commitment::Confirmed,
            fee_confirmation_repolls: 2,
            primary_build_attempts: 3,
            retry_base_ms: 500,
            retry_max_ms: 5_000,
            default_slippage_bps: 50,
            max_slippage_bps: 5_000,
        }
    }
}

impl SettlementConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

/// Exchange-route quoting service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotingConfig {
    /// Enable exchange settlements.
    pub enabled: bool,

    /// Base URL exposing `/quote` and `/swap`.
    pub base_url: String,

    /// Optional API key sent as `x-api-key`.
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for QuotingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            timeout_secs: 15,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Identity derivation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Application-wide salt. Prefer the `WALLET_ENGINE_SALT` environment variable.
    pub salt: Option<String>,
}
