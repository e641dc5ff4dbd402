//! Device-level collaborators shared by every peer
//!
//! A `Device` owns the handshake index table, the transport bind, the
//! handshake crypto, and the protocol timing profile. Peers hold an `Arc`
//! to it; nothing here is global.

mod route;

pub use route::RouteListener;

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{PeerConfig, ProtocolConfig};
use crate::conn::{Bind, Endpoint, StdNetEndpoint};
use crate::error::CryptoError;
use crate::noise::keypair::KeyPair;
use crate::noise::{HandshakeInitiation, IndexTable, NoisePublicKey};
use crate::peer::Peer;

/// Handshake cryptography, implemented outside this crate
///
/// `create_message_initiation` is expected to generate the ephemeral key,
/// fill in the peer's [`crate::noise::Handshake`], register a fresh index in
/// [`Device::indices`], and call [`Peer::timer_ephemeral_key_created`].
pub trait HandshakeCrypto: Send + Sync {
    fn create_message_initiation(&self, peer: &Peer) -> Result<HandshakeInitiation, CryptoError>;

    /// Fill in mac1 (and mac2 when a cookie is held) over a marshalled message
    fn add_macs(&self, peer: &Peer, packet: &mut [u8]);
}

/// One slot in a peer's outbound queue. A `None` packet is a keep-alive.
#[derive(Debug, Default)]
pub struct OutboundElement {
    pub packet: Option<Vec<u8>>,
    pub keypair: Option<Arc<KeyPair>>,
    pub nonce: u64,
}

impl OutboundElement {
    pub fn is_keepalive(&self) -> bool {
        self.packet.as_ref().map_or(true, |p| p.is_empty())
    }
}

pub struct Device {
    profile: ProtocolConfig,
    indices: IndexTable,
    bind: Arc<dyn Bind>,
    crypto: Arc<dyn HandshakeCrypto>,
    peers: DashMap<NoisePublicKey, Arc<Peer>>,
}

impl Device {
    pub fn new(
        profile: ProtocolConfig,
        bind: Arc<dyn Bind>,
        crypto: Arc<dyn HandshakeCrypto>,
    ) -> Arc<Self> {
        Arc::new(Self {
            profile,
            indices: IndexTable::new(),
            bind,
            crypto,
            peers: DashMap::new(),
        })
    }

    pub fn profile(&self) -> &ProtocolConfig {
        &self.profile
    }

    pub fn indices(&self) -> &IndexTable {
        &self.indices
    }

    pub fn bind(&self) -> &dyn Bind {
        self.bind.as_ref()
    }

    pub fn crypto(&self) -> &dyn HandshakeCrypto {
        self.crypto.as_ref()
    }

    pub fn new_outbound_element(&self) -> OutboundElement {
        OutboundElement::default()
    }

    /// Create a peer from its configuration and register it.
    /// An existing peer with the same key is stopped, its keys and indices
    /// dropped, and replaced.
    pub fn add_peer(self: &Arc<Self>, config: &PeerConfig) -> Arc<Peer> {
        let endpoint = config
            .endpoint
            .map(|addr| Box::new(StdNetEndpoint::new(addr)) as Box<dyn Endpoint>);
        let peer = Peer::new(
            self.clone(),
            config.public_key,
            config.preshared_key,
            endpoint,
            config.persistent_keepalive.unwrap_or(0),
        );
        if let Some(old) = self.peers.insert(config.public_key, peer.clone()) {
            old.stop();
            old.zero_all_keys();
        }
        tracing::debug!("Added {}", peer);
        peer
    }

    pub fn peer(&self, key: &NoisePublicKey) -> Option<Arc<Peer>> {
        self.peers.get(key).map(|peer| peer.clone())
    }

    /// Stop a peer's engine and drop it from the device
    pub fn remove_peer(&self, key: &NoisePublicKey) -> Option<Arc<Peer>> {
        let (_, peer) = self.peers.remove(key)?;
        peer.stop();
        peer.zero_all_keys();
        tracing::debug!("Removed {}", peer);
        Some(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Stop and remove every peer. Peers hold the device alive, so this is
    /// what releases it.
    pub fn close(&self) {
        let keys: Vec<NoisePublicKey> = self.peers.iter().map(|entry| *entry.key()).collect();
        for key in &keys {
            self.remove_peer(key);
        }
        tracing::debug!("Closed device, removed {} peers", keys.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    fn peer_config(key: u8, keepalive: Option<u16>) -> PeerConfig {
        PeerConfig {
            public_key: NoisePublicKey([key; 32]),
            preshared_key: None,
            endpoint: Some("203.0.113.9:51820".parse().unwrap()),
            allowed_ips: Vec::new(),
            persistent_keepalive: keepalive,
        }
    }

    #[test]
    fn test_outbound_element_keepalive() {
        let harness = Harness::new(ProtocolConfig::default());
        assert!(harness.device.new_outbound_element().is_keepalive());

        let elem = OutboundElement {
            packet: Some(vec![0x45, 0, 0, 20]),
            ..Default::default()
        };
        assert!(!elem.is_keepalive());
    }

    #[tokio::test]
    async fn test_add_peer_wraps_endpoint_with_key() {
        let dev = Harness::new(ProtocolConfig::default()).device;
        let peer = dev.add_peer(&peer_config(1, Some(25)));

        assert_eq!(dev.peer_count(), 1);
        assert!(Arc::ptr_eq(&dev.peer(&NoisePublicKey([1u8; 32])).unwrap(), &peer));
        assert_eq!(
            peer.persistent_keepalive_interval(),
            Some(std::time::Duration::from_secs(25))
        );
        let (dst, key) = peer
            .with_endpoint(|ep| ep.map(|ep| (ep.dst_to_string(), *ep.public_key())))
            .await
            .unwrap();
        assert_eq!(dst, "203.0.113.9:51820");
        assert_eq!(key, NoisePublicKey([1u8; 32]));
    }

    #[tokio::test]
    async fn test_replacing_peer_stops_old_one() {
        let dev = Harness::new(ProtocolConfig::default()).device;
        let first = dev.add_peer(&peer_config(2, None));
        let second = dev.add_peer(&peer_config(2, None));

        assert_eq!(dev.peer_count(), 1);
        assert!(first.signals().stop.is_closed());
        assert!(!second.signals().stop.is_closed());

        let removed = dev.remove_peer(&NoisePublicKey([2u8; 32])).unwrap();
        assert!(removed.signals().stop.is_closed());
        assert_eq!(dev.peer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_peer_releases_old_indices() {
        let harness = Harness::new(ProtocolConfig::default());
        let first = harness.peer(None);
        first.send_new_handshake().await.unwrap();
        let stale = first.handshake().lock().local_index;
        assert!(harness.device.indices().contains(stale));

        let second = harness.peer(None);

        assert!(!harness.device.indices().contains(stale));
        assert!(harness.device.indices().is_empty());
        assert!(first.handshake().lock().is_zeroed());
        assert_eq!(second.handshake().lock().local_index, 0);
    }

    #[tokio::test]
    async fn test_close_removes_every_peer() {
        let dev = Harness::new(ProtocolConfig::default()).device;
        let a = dev.add_peer(&peer_config(3, None));
        let b = dev.add_peer(&peer_config(4, Some(25)));

        dev.close();

        assert_eq!(dev.peer_count(), 0);
        assert!(a.signals().stop.is_closed());
        assert!(b.signals().stop.is_closed());
        // the device no longer holds the peers
        assert_eq!(Arc::strong_count(&a), 1);
        assert_eq!(Arc::strong_count(&b), 1);
    }
}
