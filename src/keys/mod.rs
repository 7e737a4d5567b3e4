//! Deterministic signing keys.
//!
//! # Data Flow
//! ```text
//! verified identity + application salt
//!     → derive.rs (SHA-256 seed, ed25519 keypair)
//!     → slot.rs (session-owned handle used for signing)
//!     → discarded on sign-out (zeroized)
//! ```
//!
//! # Security Constraints
//! - The same identity and salt always produce the same keypair
//! - Secret material is never logged, serialized, or placed in error text
//! - Keys live only in memory for the lifetime of a session

pub mod address;
pub mod derive;
pub mod slot;

pub use address::Address;
pub use derive::{derive, SigningKeypair, DOMAIN_TAG};
pub use slot::KeySlot;

use thiserror::Error;

/// Errors raised while deriving or using signing keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The identity credential or salt cannot be used for derivation.
    #[error("Invalid credential: {0}")]
    InvalidCredential(&'static str),

    /// The derived seed does not fit the ed25519 key scheme.
    #[error("Derived seed has {actual} bytes, key scheme requires {expected}")]
    SeedLength { expected: usize, actual: usize },

    /// A base58 address failed to decode.
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// The keypair was discarded when its session closed.
    #[error("Signing key has been discarded")]
    Discarded,
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;
