//! Settlement intents, records and errors.

use serde::Serialize;
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::NATIVE_MINT;
use crate::keys::Address;
use crate::ledger::Signature;
use crate::quoting::{ExchangeRequest, QuoteError, RouteQuote};

/// The operation the user actually asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrimaryLeg {
    /// Native transfer.
    Transfer { destination: Address, amount: u64 },
    /// Routed exchange through the quoting service.
    Exchange(ExchangeRequest),
}

impl PrimaryLeg {
    /// Lamports this leg moves out of the account.
    pub fn native_amount(&self) -> u64 {
        match self {
            PrimaryLeg::Transfer { amount, .. } => *amount,
            PrimaryLeg::Exchange(req) if req.input_mint == NATIVE_MINT => req.amount,
            PrimaryLeg::Exchange(_) => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PrimaryLeg::Transfer { .. } => "transfer",
            PrimaryLeg::Exchange(_) => "exchange",
        }
    }
}

/// A primary operation plus its mandatory platform fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementIntent {
    pub primary: PrimaryLeg,
    /// Fee in lamports.
    pub fee_amount: u64,
    pub fee_destination: Address,
}

/// Position in the settlement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Building,
    FeeSubmitted,
    FeeConfirmed,
    PrimarySubmitted,
    PrimaryConfirmed,
    FeeFailed,
    PrimaryFailed,
    Aborted,
}

impl SettlementState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementState::PrimaryConfirmed
                | SettlementState::FeeFailed
                | SettlementState::PrimaryFailed
                | SettlementState::Aborted
        )
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettlementState::Building => "building",
            SettlementState::FeeSubmitted => "fee_submitted",
            SettlementState::FeeConfirmed => "fee_confirmed",
            SettlementState::PrimarySubmitted => "primary_submitted",
            SettlementState::PrimaryConfirmed => "primary_confirmed",
            SettlementState::FeeFailed => "fee_failed",
            SettlementState::PrimaryFailed => "primary_failed",
            SettlementState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    Fee,
    Primary,
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LegKind::Fee => "fee",
            LegKind::Primary => "primary",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    NotStarted,
    /// Signed; the signature is known but no broadcast was acknowledged yet.
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

/// One transaction of a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leg {
    pub signature: Option<Signature>,
    pub status: LegStatus,
    pub submitted_at: Option<SystemTime>,
    pub confirmed_at: Option<SystemTime>,
    /// Block height after which the transaction can no longer land.
    pub last_valid_block_height: Option<u64>,
}

impl Leg {
    fn new() -> Self {
        Self {
            signature: None,
            status: LegStatus::NotStarted,
            submitted_at: None,
            confirmed_at: None,
            last_valid_block_height: None,
        }
    }
}

/// Why a leg failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegFailure {
    /// The ledger refused the broadcast.
    Rejected,
    /// Executed and failed on chain.
    FailedOnChain,
    /// Never landed before its blockhash expired.
    Expired,
    /// Could not be built, signed, or re-quoted within tolerance.
    Unbuildable,
}

/// Why a settlement stopped before anything was broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    InsufficientFunds { required: u64, available: u64 },
    Quote { message: String },
    EndpointUnavailable { message: String },
    Requested,
    SessionClosed,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::InsufficientFunds {
                required,
                available,
            } => write!(f, "insufficient funds: {} required, {} available", required, available),
            AbortReason::Quote { message } => write!(f, "quote refused: {}", message),
            AbortReason::EndpointUnavailable { message } => write!(f, "ledger unavailable: {}", message),
            AbortReason::Requested => f.write_str("aborted by request"),
            AbortReason::SessionClosed => f.write_str("session closed"),
        }
    }
}

/// User-facing result of a settlement. Every variant is distinct on purpose;
/// none of them may be collapsed into a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    InProgress,
    /// Fee and primary both confirmed.
    Completed,
    /// Stopped before any broadcast. Nothing was spent.
    Aborted(AbortReason),
    /// The fee leg failed; the primary was never attempted.
    FeeFailed { reason: String, failure: LegFailure },
    /// The fee was spent but the primary did not execute. Not refunded.
    PartialFailure { reason: String, failure: LegFailure },
    /// A confirmation wait ended without an answer. Check again later.
    ConfirmationPending { leg: LegKind },
}

impl SettlementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SettlementOutcome::InProgress => "in_progress",
            SettlementOutcome::Completed => "completed",
            SettlementOutcome::Aborted(_) => "aborted",
            SettlementOutcome::FeeFailed { .. } => "fee_failed",
            SettlementOutcome::PartialFailure { .. } => "partial_failure",
            SettlementOutcome::ConfirmationPending { .. } => "confirmation_pending",
        }
    }
}

/// Full history of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub intent: SettlementIntent,
    pub state: SettlementState,
    pub fee: Leg,
    pub primary: Leg,
    pub outcome: SettlementOutcome,
    /// Quote accepted while building an exchange.
    pub quote: Option<RouteQuote>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl SettlementRecord {
    pub(crate) fn new(intent: SettlementIntent) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            intent,
            state: SettlementState::Building,
            fee: Leg::new(),
            primary: Leg::new(),
            outcome: SettlementOutcome::InProgress,
            quote: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn fee_tx_signature(&self) -> Option<Signature> {
        self.fee.signature
    }

    pub fn primary_tx_signature(&self) -> Option<Signature> {
        self.primary.signature
    }

    /// True once the platform fee has been charged.
    pub fn fee_spent(&self) -> bool {
        self.fee.status == LegStatus::Confirmed
    }

    /// The outcome as an error, if it is one.
    pub fn error(&self) -> Option<SettlementError> {
        match &self.outcome {
            SettlementOutcome::InProgress | SettlementOutcome::Completed => None,
            SettlementOutcome::Aborted(AbortReason::InsufficientFunds {
                required,
                available,
            }) => Some(SettlementError::InsufficientFunds {
                required: *required,
                available: *available,
            }),
            SettlementOutcome::Aborted(AbortReason::EndpointUnavailable { message }) => {
                Some(SettlementError::EndpointUnavailable(message.clone()))
            }
            SettlementOutcome::Aborted(AbortReason::SessionClosed) => Some(SettlementError::SessionClosed),
            SettlementOutcome::Aborted(reason) => Some(SettlementError::Aborted(reason.to_string())),
            SettlementOutcome::FeeFailed {
                reason,
                failure: LegFailure::Rejected,
            } => Some(SettlementError::BroadcastRejected(reason.clone())),
            SettlementOutcome::FeeFailed { reason, .. } => Some(SettlementError::FeeFailed(reason.clone())),
            SettlementOutcome::PartialFailure { reason, .. } => Some(SettlementError::PartialSettlementFailure {
                fee_signature: self.fee.signature,
                reason: reason.clone(),
            }),
            SettlementOutcome::ConfirmationPending { leg } => Some(SettlementError::ConfirmationTimeout {
                id: self.id,
                leg: *leg,
            }),
        }
    }
}

/// Errors surfaced by the settlement orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Another settlement occupies the session's slot.
    #[error("A settlement is already in flight")]
    Busy { active: Option<Uuid> },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Insufficient funds: {required} lamports required, {available} available")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Transaction rejected: {0}")]
    BroadcastRejected(String),

    /// Ambiguous; the record can be re-checked.
    #[error("Confirmation of the {leg} transaction timed out; status unknown")]
    ConfirmationTimeout { id: Uuid, leg: LegKind },

    /// Fee charged, primary not executed.
    #[error("Fee was charged but the primary operation failed: {reason}")]
    PartialSettlementFailure {
        fee_signature: Option<Signature>,
        reason: String,
    },

    #[error("Fee transaction failed: {0}")]
    FeeFailed(String),

    #[error("Settlement aborted: {0}")]
    Aborted(String),

    #[error("No ledger endpoint available: {0}")]
    EndpointUnavailable(String),

    #[error("Invalid settlement intent: {0}")]
    InvalidIntent(String),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error("Unknown settlement {0}")]
    UnknownRecord(Uuid),

    #[error("Settlement {0} has not finished")]
    NotTerminal(Uuid),

    #[error("Settlement {0} can no longer be aborted")]
    NotAbortable(Uuid),
}

/// Result type for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;
