//! Noise-side state owned by the lifecycle engine
//!
//! This module contains the key material the timers age out:
//! - Key types
//! - Session key pairs and the previous/current/next store
//! - In-flight handshake state
//! - The device-wide index table
//! - The handshake initiation wire format

pub mod handshake;
pub mod index;
pub mod keypair;
pub mod keys;
pub mod messages;

pub use handshake::{Handshake, HandshakeState, HandshakeStatus};
pub use index::{IndexKind, IndexTable, IndexTableEntry};
pub use keypair::{KeyPair, KeyPairSlots, KeyPairs};
pub use keys::{NoisePrivateKey, NoisePublicKey};
pub use messages::{HandshakeInitiation, MessageType};
