//! Fee-then-primary settlement.
//!
//! # Data Flow
//! ```text
//! SettlementIntent
//!     → Building          funds check, quote (exchange), fee signed + broadcast
//!     → FeeSubmitted      confirm fee (timeouts re-polled, never resubmitted)
//!     → FeeConfirmed      primary built, signed, broadcast
//!     → PrimarySubmitted  confirm primary
//!     → PrimaryConfirmed  balance refreshed
//!
//! Failure exits: Aborted (nothing sent), FeeFailed (primary never sent),
//! PrimaryFailed (fee spent, primary not executed)
//! ```

pub mod fees;
pub mod orchestrator;
pub mod types;

pub use fees::FeeSchedule;
pub use orchestrator::SettlementOrchestrator;
pub use types::{
    AbortReason, Leg, LegFailure, LegKind, LegStatus, PrimaryLeg, SettlementError, SettlementIntent,
    SettlementOutcome, SettlementRecord, SettlementResult, SettlementState,
};
