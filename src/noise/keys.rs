//! Curve25519 key types
//!
//! Static and ephemeral keys used to identify peers and seed handshakes.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Key length for X25519 (both private and public keys are 32 bytes)
pub const KEY_LEN: usize = 32;

/// A peer's long-term (or ephemeral) public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NoisePublicKey(pub [u8; KEY_LEN]);

/// A private key, wiped from memory when dropped
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct NoisePrivateKey([u8; KEY_LEN]);

impl NoisePublicKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// All-zero keys are the identity point and never name a real peer
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl fmt::Debug for NoisePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoisePublicKey({})", self.to_base64())
    }
}

impl fmt::Display for NoisePublicKey {
    /// Abbreviated form used in log lines: `AbCd…WxYz`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "{}…{}", &b64[..4], &b64[b64.len() - 5..b64.len() - 1])
    }
}

impl From<[u8; KEY_LEN]> for NoisePublicKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl NoisePrivateKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh key, used for handshake ephemerals
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self(secret.to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> NoisePublicKey {
        let secret = StaticSecret::from(self.0);
        NoisePublicKey(PublicKey::from(&secret).to_bytes())
    }
}

impl fmt::Debug for NoisePrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoisePrivateKey(<redacted>)")
    }
}

/// Overwrite a key buffer with zeros
pub fn set_zero(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_derive() {
        let private = NoisePrivateKey::generate();
        let public = private.public_key();

        assert!(!private.is_zero());
        assert!(!public.is_zero());
        assert_eq!(public, private.public_key());
    }

    #[test]
    fn test_from_slice_length() {
        assert!(NoisePublicKey::from_slice(&[1u8; 32]).is_ok());
        assert!(matches!(
            NoisePublicKey::from_slice(&[1u8; 16]),
            Err(CryptoError::InvalidKeyLength { expected: 32, got: 16 })
        ));
    }

    #[test]
    fn test_display_is_abbreviated() {
        let key = NoisePublicKey([7u8; 32]);
        let b64 = key.to_base64();
        let shown = key.to_string();

        assert!(shown.starts_with(&b64[..4]));
        assert_eq!(shown.chars().count(), 9);
    }

    #[test]
    fn test_set_zero() {
        let mut buf = [0xAAu8; 32];
        set_zero(&mut buf);
        assert_eq!(buf, [0u8; 32]);
    }
}
