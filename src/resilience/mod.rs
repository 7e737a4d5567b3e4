//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Endpoint failure reported:
//!     → backoff.rs (how many selections the endpoint sits out)
//! Confirmation re-poll / websocket reconnect:
//!     → backoff.rs (jittered delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Endpoint backoff counts selections, not wall-clock time
//! - Wall-clock delays carry jitter so sessions do not retry in lockstep

pub mod backoff;

pub use backoff::{retry_delay, selection_backoff};
