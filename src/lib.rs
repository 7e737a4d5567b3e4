//! Wallet session and two-leg settlement engine.
//!
//! # Architecture Overview
//!
//! ```text
//!   identity + salt
//!         │
//!         ▼
//!   ┌──────────┐     ┌──────────────┐     ┌──────────────────────────┐
//!   │   keys   │────▶│   session    │────▶│       settlement         │
//!   │ derive / │     │ open / close │     │ fee → confirm → primary  │
//!   │ key slot │     └──────┬───────┘     └────────────┬─────────────┘
//!   └──────────┘            │                          │
//!                           ▼                          ▼
//!                    ┌──────────────┐           ┌──────────────┐
//!                    │   balance    │           │   quoting    │
//!                    │ poll / push  │           │ /quote /swap │
//!                    └──────┬───────┘           └──────────────┘
//!                           │
//!                           ▼
//!                    ┌──────────────┐     ┌──────────────┐     ┌─────────┐
//!                    │    ledger    │────▶│  endpoints   │────▶│   rpc   │
//!                    │ build / sign │     │ pool / probe │     │ JSON-RPC│
//!                    │ confirm      │     └──────────────┘     └─────────┘
//!                    └──────────────┘
//!
//!   Cross-cutting: config, observability, resilience, catalog
//! ```

// Identity and signing
pub mod keys;
pub mod session;

// Ledger access
pub mod endpoints;
pub mod ledger;
pub mod rpc;

// Wallet features
pub mod balance;
pub mod catalog;
pub mod quoting;
pub mod settlement;

// Cross-cutting concerns
pub mod config;
pub mod observability;
pub mod resilience;

pub use config::schema::WalletConfig;
pub use session::{Session, SessionError};
pub use settlement::{SettlementOrchestrator, SettlementRecord};
