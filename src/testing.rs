//! Fakes for the transport and crypto collaborators
//!
//! Compiled for unit tests and behind the `test-util` feature for the
//! integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{PeerConfig, ProtocolConfig};
use crate::conn::{Bind, Endpoint};
use crate::device::{Device, HandshakeCrypto};
use crate::error::{CryptoError, NetworkError};
use crate::noise::{HandshakeInitiation, HandshakeStatus, NoisePrivateKey, NoisePublicKey};
use crate::peer::Peer;

/// Where [`Harness::peer`] places its peer
pub const PEER_ENDPOINT: &str = "192.0.2.10:51820";

/// Records datagrams instead of sending them; fails every send while `fail` is set
#[derive(Default)]
pub struct RecordingBind {
    pub sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Bind for RecordingBind {
    async fn send(&self, buf: &[u8], endpoint: &dyn Endpoint) -> Result<(), NetworkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetworkError::SendFailed {
                reason: "unreachable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((buf.to_vec(), endpoint.dst_addr()));
        Ok(())
    }
}

/// Fills handshake state the way real initiation creation does, minus the math
#[derive(Default)]
pub struct ScriptedCrypto {
    pub fail: AtomicBool,
    pub initiations: AtomicUsize,
}

impl HandshakeCrypto for ScriptedCrypto {
    fn create_message_initiation(&self, peer: &Peer) -> Result<HandshakeInitiation, CryptoError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CryptoError::KeyDerivation);
        }
        self.initiations.fetch_add(1, Ordering::SeqCst);

        let indices = peer.device().indices();
        let (index, ephemeral_public) = {
            let mut hs = peer.handshake().lock();
            indices.delete(hs.local_index);
            hs.local_index = indices.new_index(*peer.public_key())?;
            hs.local_ephemeral = NoisePrivateKey::generate();
            hs.chain_key = [1u8; 32];
            hs.hash = [2u8; 32];
            hs.status = HandshakeStatus::InitiationCreated;
            (hs.local_index, hs.local_ephemeral.public_key())
        };
        peer.timer_ephemeral_key_created();

        Ok(HandshakeInitiation::new(
            index,
            ephemeral_public.0,
            [0u8; 48],
            [0u8; 28],
        ))
    }

    fn add_macs(&self, _peer: &Peer, packet: &mut [u8]) {
        packet[HandshakeInitiation::MAC1_OFFSET..HandshakeInitiation::MAC2_OFFSET].fill(0xAA);
    }
}

pub struct Harness {
    pub device: Arc<Device>,
    pub bind: Arc<RecordingBind>,
    pub crypto: Arc<ScriptedCrypto>,
}

impl Harness {
    pub fn new(profile: ProtocolConfig) -> Self {
        let bind = Arc::new(RecordingBind::default());
        let crypto = Arc::new(ScriptedCrypto::default());
        let device = Device::new(profile, bind.clone(), crypto.clone());
        Self {
            device,
            bind,
            crypto,
        }
    }

    pub fn peer(&self, keepalive: Option<u16>) -> Arc<Peer> {
        self.device.add_peer(&PeerConfig {
            public_key: NoisePublicKey([0x42; 32]),
            preshared_key: None,
            endpoint: Some(PEER_ENDPOINT.parse().unwrap()),
            allowed_ips: Vec::new(),
            persistent_keepalive: keepalive,
        })
    }

    /// Datagrams that reached the bind
    pub fn sent_count(&self) -> usize {
        self.bind.sent.lock().unwrap().len()
    }
}
