//! Session key pairs and the per-peer three-slot store
//!
//! A peer holds at most three generations of transport keys:
//! - `next`: confirmed by us as responder, not yet used by the initiator
//! - `current`: the key pair outbound packets are encrypted with
//! - `previous`: kept briefly so in-flight packets under the old key still decrypt

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use zeroize::Zeroizing;

use crate::noise::index::IndexTable;
use crate::noise::keys::KEY_LEN;

/// Symmetric transport key, wiped when the last holder drops it
pub type SymmetricKey = Zeroizing<[u8; KEY_LEN]>;

/// One generation of transport keys
pub struct KeyPair {
    send_key: SymmetricKey,
    receive_key: SymmetricKey,
    created: Instant,
    is_initiator: bool,
    /// Incremented by the outbound pipeline for every packet encrypted
    send_nonce: AtomicU64,
    /// Our index, registered in the device index table
    pub local_index: u32,
    /// The peer's index, placed in outbound transport headers
    pub remote_index: u32,
}

impl KeyPair {
    pub fn new(
        send_key: [u8; KEY_LEN],
        receive_key: [u8; KEY_LEN],
        is_initiator: bool,
        local_index: u32,
        remote_index: u32,
    ) -> Self {
        Self {
            send_key: Zeroizing::new(send_key),
            receive_key: Zeroizing::new(receive_key),
            created: Instant::now(),
            is_initiator,
            send_nonce: AtomicU64::new(0),
            local_index,
            remote_index,
        }
    }

    pub fn send_key(&self) -> &[u8; KEY_LEN] {
        &self.send_key
    }

    pub fn receive_key(&self) -> &[u8; KEY_LEN] {
        &self.receive_key
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn send_nonce(&self) -> u64 {
        self.send_nonce.load(Ordering::Acquire)
    }

    /// Claim the nonce for the next outbound packet
    pub fn next_send_nonce(&self) -> u64 {
        self.send_nonce.fetch_add(1, Ordering::AcqRel)
    }

    /// Mark the nonce space as spent so no holder encrypts with it again
    fn invalidate(&self) {
        self.send_nonce.store(u64::MAX, Ordering::Release);
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("local_index", &self.local_index)
            .field("remote_index", &self.remote_index)
            .field("is_initiator", &self.is_initiator)
            .field("send_nonce", &self.send_nonce())
            .finish_non_exhaustive()
    }
}

/// Drop a key pair from service: unregister its index and burn its nonce space.
/// Key bytes are zeroed once the last outstanding reference goes away.
pub fn delete_keypair(indices: &IndexTable, keypair: Option<Arc<KeyPair>>) {
    if let Some(keypair) = keypair {
        indices.delete(keypair.local_index);
        keypair.invalidate();
    }
}

/// The three key-pair slots, only reachable through the store's lock
#[derive(Debug, Default)]
pub struct KeyPairSlots {
    pub previous: Option<Arc<KeyPair>>,
    pub current: Option<Arc<KeyPair>>,
    pub next: Option<Arc<KeyPair>>,
}

impl KeyPairSlots {
    pub fn is_empty(&self) -> bool {
        self.previous.is_none() && self.current.is_none() && self.next.is_none()
    }

    /// Destroy every generation
    pub fn delete_all(&mut self, indices: &IndexTable) {
        delete_keypair(indices, self.previous.take());
        delete_keypair(indices, self.current.take());
        delete_keypair(indices, self.next.take());
    }
}

/// Per-peer key-pair store; one mutex covers all three slots
#[derive(Debug, Default)]
pub struct KeyPairs {
    slots: Mutex<KeyPairSlots>,
}

impl KeyPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, KeyPairSlots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<Arc<KeyPair>> {
        self.lock().current.clone()
    }

    /// Install a key pair we derived as initiator; it is usable immediately
    pub fn install_initiator(&self, keypair: Arc<KeyPair>, indices: &IndexTable) {
        let mut slots = self.lock();
        let previous = slots.previous.take();
        let current = slots.current.take();
        match slots.next.take() {
            Some(next) => {
                slots.previous = Some(next);
                delete_keypair(indices, current);
            }
            None => slots.previous = current,
        }
        delete_keypair(indices, previous);
        slots.current = Some(keypair);
    }

    /// Install a key pair we derived as responder; it waits in `next`
    /// until the initiator proves it holds the same keys
    pub fn install_responder(&self, keypair: Arc<KeyPair>, indices: &IndexTable) {
        let mut slots = self.lock();
        let next = slots.next.replace(keypair);
        delete_keypair(indices, next);
        let previous = slots.previous.take();
        delete_keypair(indices, previous);
    }

    /// Called when a transport packet authenticated under `keypair`.
    /// Promotes `next` to `current` on first use; returns whether a rotation happened.
    pub fn received_with_keypair(&self, keypair: &Arc<KeyPair>, indices: &IndexTable) -> bool {
        let mut slots = self.lock();
        let is_next = slots
            .next
            .as_ref()
            .is_some_and(|next| Arc::ptr_eq(next, keypair));
        if !is_next {
            return false;
        }
        let old = slots.previous.take();
        delete_keypair(indices, old);
        slots.previous = slots.current.take();
        slots.current = slots.next.take();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::keys::NoisePublicKey;

    fn keypair(indices: &IndexTable, initiator: bool) -> Arc<KeyPair> {
        let index = indices.new_index(NoisePublicKey([9u8; 32])).unwrap();
        indices.swap_for_keypair(index);
        Arc::new(KeyPair::new([1u8; 32], [2u8; 32], initiator, index, 77))
    }

    #[test]
    fn test_nonce_counter() {
        let kp = KeyPair::new([1u8; 32], [2u8; 32], true, 1, 2);
        assert_eq!(kp.next_send_nonce(), 0);
        assert_eq!(kp.next_send_nonce(), 1);
        assert_eq!(kp.send_nonce(), 2);
    }

    #[test]
    fn test_initiator_rotation() {
        let indices = IndexTable::new();
        let store = KeyPairs::new();

        let first = keypair(&indices, true);
        let second = keypair(&indices, true);
        let third = keypair(&indices, true);

        store.install_initiator(first.clone(), &indices);
        store.install_initiator(second.clone(), &indices);
        {
            let slots = store.lock();
            assert!(Arc::ptr_eq(slots.current.as_ref().unwrap(), &second));
            assert!(Arc::ptr_eq(slots.previous.as_ref().unwrap(), &first));
        }

        store.install_initiator(third.clone(), &indices);
        assert!(!indices.contains(first.local_index));
        assert_eq!(first.send_nonce(), u64::MAX);
        assert!(Arc::ptr_eq(&store.current().unwrap(), &third));
    }

    #[test]
    fn test_responder_promotion() {
        let indices = IndexTable::new();
        let store = KeyPairs::new();

        let old = keypair(&indices, true);
        store.install_initiator(old.clone(), &indices);

        let fresh = keypair(&indices, false);
        store.install_responder(fresh.clone(), &indices);
        assert!(Arc::ptr_eq(&store.current().unwrap(), &old));

        // Traffic under the current key does not rotate anything
        assert!(!store.received_with_keypair(&old, &indices));

        assert!(store.received_with_keypair(&fresh, &indices));
        let slots = store.lock();
        assert!(Arc::ptr_eq(slots.current.as_ref().unwrap(), &fresh));
        assert!(Arc::ptr_eq(slots.previous.as_ref().unwrap(), &old));
        assert!(slots.next.is_none());
    }

    #[test]
    fn test_delete_all_unregisters_indices() {
        let indices = IndexTable::new();
        let store = KeyPairs::new();

        store.install_initiator(keypair(&indices, true), &indices);
        store.install_initiator(keypair(&indices, true), &indices);
        store.install_responder(keypair(&indices, false), &indices);

        let mut slots = store.lock();
        slots.delete_all(&indices);

        assert!(slots.is_empty());
        assert!(indices.is_empty());
    }
}
