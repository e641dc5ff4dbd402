//! In-flight handshake material for one peer
//!
//! The Noise math that fills these fields in lives with the handshake crypto
//! collaborator; this module only owns the storage, its lock, and its teardown.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::noise::index::IndexTable;
use crate::noise::keys::{set_zero, NoisePrivateKey, NoisePublicKey, KEY_LEN};

/// Progress of the handshake attempt held in [`Handshake`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeStatus {
    #[default]
    Zeroed,
    InitiationCreated,
    InitiationConsumed,
    ResponseCreated,
    ResponseConsumed,
}

#[derive(Debug, Default)]
pub struct Handshake {
    pub status: HandshakeStatus,
    pub local_ephemeral: NoisePrivateKey,
    pub remote_ephemeral: NoisePublicKey,
    pub chain_key: [u8; KEY_LEN],
    pub hash: [u8; KEY_LEN],
    /// Registered in the device index table while non-zero
    pub local_index: u32,
}

impl Handshake {
    pub fn is_zeroed(&self) -> bool {
        self.status == HandshakeStatus::Zeroed
            && self.local_index == 0
            && self.local_ephemeral.is_zero()
            && self.remote_ephemeral.is_zero()
            && self.chain_key.iter().all(|&b| b == 0)
            && self.hash.iter().all(|&b| b == 0)
    }

    /// Forget the attempt: unregister its index and wipe all key material
    pub fn clear(&mut self, indices: &IndexTable) {
        indices.delete(self.local_index);
        self.local_index = 0;
        self.status = HandshakeStatus::Zeroed;
        self.local_ephemeral = NoisePrivateKey::default();
        set_zero(&mut self.remote_ephemeral.0);
        set_zero(&mut self.chain_key);
        set_zero(&mut self.hash);
    }
}

/// A [`Handshake`] behind the single mutex that guards all of its fields
#[derive(Debug, Default)]
pub struct HandshakeState {
    inner: Mutex<Handshake>,
}

impl HandshakeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Handshake> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
