//! Endpoint selection subsystem.
//!
//! # Data Flow
//! ```text
//! Ledger call needs an endpoint
//!     → pool.rs (rank candidates, apply backoff, degrade if all unhealthy)
//!     → endpoint.rs (health metadata for the chosen endpoint)
//!     → caller reports outcome → failures counted, backoff armed
//!
//! Background:
//!     → monitor.rs (probe_all on an interval)
//! ```
//!
//! # Design Decisions
//! - Health state lives in atomics on each endpoint; no pool-wide lock
//! - Backoff counts selections, so a failed endpoint returns on its own
//! - Selection never fails; callers always get someone to try

pub mod endpoint;
pub mod monitor;
pub mod pool;

pub use endpoint::{Endpoint, EndpointStatus};
pub use monitor::ProbeMonitor;
pub use pool::EndpointPool;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("No valid endpoints configured")]
    NoEndpoints,
}
