//! PeerGuard - WireGuard peer session lifecycle
//!
//! The timer-driven state machine that decides, per peer, when to initiate or
//! retry a handshake, when to rekey, when to send keep-alives, and when to
//! destroy stale key material.
//!
//! # Features
//!
//! - Six resettable timers and four coalescing signals per peer
//! - One engine task per peer, stopped by a broadcast signal
//! - Rekey by message count and key age, with a last-minute receive-side attempt
//! - Handshake retry with jitter, bounded by an overall attempt deadline
//! - Key material wiped after an unconfirmed handshake goes stale
//! - Endpoints tagged with the peer's public key for NAT roaming
//!
//! Handshake cryptography and packet I/O are supplied by the caller through
//! [`device::HandshakeCrypto`] and [`conn::Bind`].
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use peerguard::conn::UdpBind;
//! use peerguard::device::{Device, HandshakeCrypto};
//! use peerguard::{ProtocolConfig, WireGuardConfig};
//!
//! async fn run(crypto: Arc<dyn HandshakeCrypto>) -> peerguard::Result<()> {
//!     let config = WireGuardConfig::from_file("wg0.conf")?;
//!     let bind = Arc::new(UdpBind::bind("0.0.0.0:51820".parse().unwrap()).await?);
//!     let device = Device::new(ProtocolConfig::default(), bind, crypto);
//!
//!     for peer_config in &config.peers {
//!         let peer = device.add_peer(peer_config);
//!         peer.start();
//!         peer.signals().handshake_begin.send();
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conn;
pub mod device;
pub mod error;
pub mod event;
pub mod noise;
pub mod peer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{ProtocolConfig, WireGuardConfig};
pub use conn::{Endpoint, KeyedEndpoint};
pub use device::Device;
pub use error::{PeerGuardError, Result};
pub use peer::{Peer, TimerEvent};
