//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → WalletConfig (validated, immutable)
//!     → passed to the pool, ledger client and sessions at startup
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The identity salt can come from the environment so it stays out of files

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BalanceConfig, EndpointConfig, IdentityConfig, ObservabilityConfig, PoolConfig, QuotingConfig,
    RpcConfig, SettlementConfig, WalletConfig,
};
pub use validation::{validate_config, ValidationError};
