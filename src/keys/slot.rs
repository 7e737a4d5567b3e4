//! Session-owned signing handle.

use std::sync::{Arc, RwLock};

use super::{Address, KeyError, KeyResult, SigningKeypair};

/// Shared handle to a session's keypair.
///
/// Clones refer to the same keypair; after [`KeySlot::discard`] every clone
/// refuses to sign and the secret material has been dropped.
#[derive(Clone)]
pub struct KeySlot {
    address: Address,
    inner: Arc<RwLock<Option<SigningKeypair>>>,
}

impl KeySlot {
    pub fn new(keypair: SigningKeypair) -> Self {
        Self {
            address: keypair.address(),
            inner: Arc::new(RwLock::new(Some(keypair))),
        }
    }

    /// Public address of the keypair. Still available after discard.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign with the held keypair.
    pub fn sign(&self, message: &[u8]) -> KeyResult<[u8; 64]> {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .as_ref()
            .map(|keypair| keypair.sign(message))
            .ok_or(KeyError::Discarded)
    }

    /// Drop the keypair. Idempotent.
    pub fn discard(&self) {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.take().is_some() {
            tracing::debug!(address = %self.address, "Signing key discarded");
        }
    }

    pub fn is_discarded(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl std::fmt::Debug for KeySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySlot")
            .field("address", &self.address)
            .field("discarded", &self.is_discarded())
            .finish()
    }
}
