//! Identity credential → ed25519 signing keypair.
//!
//! # Derivation
//! ```text
//! seed = SHA-256(identity || salt || DOMAIN_TAG)
//! keypair = ed25519(seed)
//! ```
//!
//! The digest is used directly as the ed25519 seed, so the output depends only
//! on the input bytes and is identical on every platform.

use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use super::{Address, KeyError, KeyResult};

/// Domain-separation tag appended to every derivation input.
pub const DOMAIN_TAG: &[u8] = b"wallet-engine/ed25519-seed/v1";

/// Derive the session signing keypair for a verified identity.
///
/// Fails with [`KeyError::InvalidCredential`] for a blank identity or an empty salt.
pub fn derive(identity: &str, salt: &str) -> KeyResult<SigningKeypair> {
    if identity.trim().is_empty() {
        return Err(KeyError::InvalidCredential("identity is empty"));
    }
    if salt.is_empty() {
        return Err(KeyError::InvalidCredential("salt is empty"));
    }

    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(salt.as_bytes());
    hasher.update(DOMAIN_TAG);
    let mut digest = hasher.finalize();

    let seed = seed_from_digest(&digest);
    digest.as_mut_slice().zeroize();
    let seed = seed?;

    Ok(SigningKeypair::from_seed(&seed))
}

fn seed_from_digest(digest: &[u8]) -> KeyResult<Zeroizing<[u8; SECRET_KEY_LENGTH]>> {
    let seed: [u8; SECRET_KEY_LENGTH] = digest.try_into().map_err(|_| KeyError::SeedLength {
        expected: SECRET_KEY_LENGTH,
        actual: digest.len(),
    })?;
    Ok(Zeroizing::new(seed))
}

/// An ed25519 keypair owned by one session.
///
/// Not `Clone` and not serializable; the secret half is wiped when dropped.
pub struct SigningKeypair {
    signing_key: SigningKey,
    address: Address,
}

impl SigningKeypair {
    fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let address = Address::new(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// The public address (base58 when displayed).
    pub fn address(&self) -> Address {
        self.address
    }

    /// The 64-byte `seed || public key` encoding.
    pub fn secret_material(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    /// Sign raw message bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive("user@example.com", "S").unwrap();
        let b = derive("user@example.com", "S").unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(*a.secret_material(), *b.secret_material());
    }

    #[test]
    fn test_matches_reference_construction() {
        let mut hasher = Sha256::new();
        hasher.update(b"user@example.com");
        hasher.update(b"S");
        hasher.update(DOMAIN_TAG);
        let seed: [u8; 32] = hasher.finalize().as_slice().try_into().unwrap();
        let expected = SigningKey::from_bytes(&seed);

        let keypair = derive("user@example.com", "S").unwrap();
        assert_eq!(keypair.address().as_bytes(), &expected.verifying_key().to_bytes());
        assert_eq!(&keypair.secret_material()[..32], &seed);
        assert_eq!(&keypair.secret_material()[32..], keypair.address().as_bytes());
    }

    #[test]
    fn test_inputs_change_the_key() {
        let base = derive("user@example.com", "S").unwrap().address();
        assert_ne!(base, derive("user@example.org", "S").unwrap().address());
        assert_ne!(base, derive("user@example.com", "T").unwrap().address());
    }

    #[test]
    fn test_rejects_blank_credentials() {
        assert_eq!(
            derive("   ", "S").unwrap_err(),
            KeyError::InvalidCredential("identity is empty")
        );
        assert_eq!(
            derive("user@example.com", "").unwrap_err(),
            KeyError::InvalidCredential("salt is empty")
        );
    }

    #[test]
    fn test_wrong_seed_length_fails_loudly() {
        let err = seed_from_digest(&[7u8; 20]).unwrap_err();
        assert_eq!(err, KeyError::SeedLength { expected: 32, actual: 20 });
    }

    #[test]
    fn test_signature_verifies_against_address() {
        let keypair = derive("user@example.com", "S").unwrap();
        let signature = keypair.sign(b"hello");
        assert!(keypair.address().verify(b"hello", &signature));
        assert!(!keypair.address().verify(b"hullo", &signature));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keypair = derive("user@example.com", "S").unwrap();
        let rendered = format!("{:?}", keypair);
        assert!(rendered.contains("<redacted>"));
        let secret_b58 = bs58::encode(&keypair.secret_material()[..]).into_string();
        assert!(!rendered.contains(&secret_b58));
    }
}
