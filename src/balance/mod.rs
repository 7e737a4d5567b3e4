//! Balance tracking subsystem.
//!
//! # Data Flow
//! ```text
//! tracker.rs (interval timer / force_refresh / invalidate)
//!     → LedgerClient::get_balance
//!     → success: snapshot.rs live value
//!     → failure: previous value kept, marked stale
//!
//! subscription.rs (websocket account notifications)
//!     → tracker.invalidate() → early poll
//! ```
//!
//! # Design Decisions
//! - A failed poll never resets the balance to zero
//! - Readers only ever see whole snapshots

pub mod snapshot;
pub mod subscription;
pub mod tracker;

pub use snapshot::{BalanceSnapshot, BalanceSource};
pub use subscription::AccountSubscription;
pub use tracker::BalanceTracker;
