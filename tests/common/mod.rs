//! Shared test helpers for peerguard integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use peerguard::noise::KeyPair;
use peerguard::Peer;

/// Let the engine task run for `duration` of (paused) virtual time.
pub async fn run_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Give the engine task a chance to react to a signal.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Register a fresh index and install an initiator key pair under it.
pub fn install_initiator_keypair(peer: &Peer) -> Arc<KeyPair> {
    let indices = peer.device().indices();
    let index = indices.new_index(*peer.public_key()).unwrap();
    indices.swap_for_keypair(index);
    let keypair = Arc::new(KeyPair::new([1u8; 32], [2u8; 32], true, index, 99));
    peer.keypairs().install_initiator(keypair.clone(), indices);
    keypair
}
