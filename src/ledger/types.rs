//! Ledger value types and error definitions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::keys::KeyError;
use crate::rpc::RpcError;

/// Assurance level at which a transaction counts as settled.
///
/// Ordered: `Processed < Confirmed < Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    /// Parse the `confirmationStatus` string returned by the ledger.
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "processed" => Some(Commitment::Processed),
            "confirmed" => Some(Commitment::Confirmed),
            "finalized" => Some(Commitment::Finalized),
            _ => None,
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! base58_bytes {
    ($name:ident, $len:expr, $what:expr) => {
        impl $name {
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&bs58::encode(self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let invalid = || LedgerError::InvalidResponse(format!("invalid {} '{}'", $what, s));
                let bytes = bs58::decode(s.trim()).into_vec().map_err(|_| invalid())?;
                let bytes: [u8; $len] = bytes.try_into().map_err(|_| invalid())?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// A transaction signature; doubles as the transaction id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 64]);

base58_bytes!(Signature, 64, "signature");

/// A recent blockhash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Blockhash([u8; 32]);

base58_bytes!(Blockhash, 32, "blockhash");

/// Replay-protection handle needed to build a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockhashHandle {
    pub blockhash: Blockhash,
    /// Last block height at which a transaction using this blockhash can land.
    pub last_valid_block_height: u64,
}

/// Status of a submitted transaction as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    /// `None` when the endpoint omits the field.
    pub commitment: Option<Commitment>,
    /// On-chain execution error, rendered as text.
    pub err: Option<String>,
}

impl SignatureStatus {
    /// True when the status has reached `target`.
    pub fn reaches(&self, target: Commitment) -> bool {
        self.commitment.map(|c| c >= target).unwrap_or(false)
    }
}

/// Result of waiting for a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Reached the target commitment.
    Confirmed { slot: u64, commitment: Commitment },
    /// Executed and failed on chain.
    FailedOnChain { reason: String },
    /// Never landed and its blockhash is no longer valid.
    Expired,
    /// Still unknown when the wait ended. Not a failure.
    TimedOut,
}

impl ConfirmationOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationOutcome::TimedOut)
    }
}

/// Errors surfaced by the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Both the selected endpoint and its failover failed.
    #[error("No ledger endpoint available: {0}")]
    EndpointUnavailable(RpcError),

    /// A healthy endpoint refused the request.
    #[error("Ledger refused request: {0}")]
    Rpc(RpcError),

    /// The ledger rejected a transaction outright.
    #[error("Transaction rejected: {0}")]
    BroadcastRejected(String),

    /// The response parsed but did not carry the expected shape.
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),

    /// Transaction could not be assembled or signed.
    #[error("Transaction build failed: {0}")]
    Build(String),

    /// Signing key is unavailable.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_ordering() {
        assert!(Commitment::Processed < Commitment::Confirmed);
        assert!(Commitment::Confirmed < Commitment::Finalized);
        assert_eq!(Commitment::from_status("finalized"), Some(Commitment::Finalized));
        assert_eq!(Commitment::from_status("bogus"), None);
    }

    #[test]
    fn test_status_reaches_target() {
        let status = SignatureStatus {
            slot: 10,
            commitment: Some(Commitment::Confirmed),
            err: None,
        };
        assert!(status.reaches(Commitment::Processed));
        assert!(status.reaches(Commitment::Confirmed));
        assert!(!status.reaches(Commitment::Finalized));
    }

    #[test]
    fn test_signature_base58() {
        let sig = Signature::new([7u8; 64]);
        let parsed: Signature = sig.to_string().parse().unwrap();
        assert_eq!(parsed, sig);
        assert!("abc".parse::<Signature>().is_err());
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(ConfirmationOutcome::FailedOnChain {
            reason: "InsufficientFundsForRent".to_string(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "failed_on_chain");
        assert!(!ConfirmationOutcome::TimedOut.is_terminal());
    }
}
