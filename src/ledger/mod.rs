//! Ledger access subsystem.
//!
//! # Data Flow
//! ```text
//! Settlement / balance polling
//!     → client.rs (select endpoint, call, report outcome, fail over once)
//!     → transaction.rs (build and sign transfers, sign prebuilt payloads)
//!     → types.rs (signatures, blockhash handles, confirmation outcomes)
//! ```
//!
//! # Security Constraints
//! - Signing goes through a `KeySlot`; this layer never sees secret bytes
//! - All RPC calls have configurable timeouts
//! - A confirmation timeout is reported as such, never as a failure

pub mod client;
pub mod transaction;
pub mod types;

pub use client::LedgerClient;
pub use transaction::{sign_prebuilt, sign_transfer, SignedTransaction};
pub use types::{
    Blockhash, BlockhashHandle, Commitment, ConfirmationOutcome, LedgerError, LedgerResult,
    Signature, SignatureStatus,
};
