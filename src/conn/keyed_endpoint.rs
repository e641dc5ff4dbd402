use std::net::{IpAddr, SocketAddr};

use crate::conn::Endpoint;
use crate::noise::keys::NoisePublicKey;

/// An [`Endpoint`] that also knows the public key of the peer behind it.
///
/// Lets the receive path decide whether a packet arriving from an unfamiliar
/// address belongs to a known peer, so the peer's address can be updated in
/// place of tearing down its session. Needed for peers behind NAT gateways
/// whose public mapping is destination dependent: the port the remote side
/// observes differs from the one discovered via STUN.
///
/// Never mutated in place beyond `clear_src`; a roaming peer gets a new one.
#[derive(Debug)]
pub struct KeyedEndpoint {
    inner: Box<dyn Endpoint>,
    key: NoisePublicKey,
}

impl KeyedEndpoint {
    pub fn new(inner: Box<dyn Endpoint>, key: NoisePublicKey) -> Self {
        Self { inner, key }
    }

    /// The wrapped endpoint, for callers that compare or replace the raw address
    pub fn inner(&self) -> &dyn Endpoint {
        self.inner.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn Endpoint> {
        self.inner
    }

    pub fn public_key(&self) -> &NoisePublicKey {
        &self.key
    }
}

impl Endpoint for KeyedEndpoint {
    fn clear_src(&mut self) {
        self.inner.clear_src()
    }

    fn src_to_string(&self) -> String {
        self.inner.src_to_string()
    }

    fn dst_to_string(&self) -> String {
        self.inner.dst_to_string()
    }

    fn dst_to_bytes(&self) -> Vec<u8> {
        self.inner.dst_to_bytes()
    }

    fn dst_ip(&self) -> IpAddr {
        self.inner.dst_ip()
    }

    fn src_ip(&self) -> Option<IpAddr> {
        self.inner.src_ip()
    }

    fn dst_addr(&self) -> SocketAddr {
        self.inner.dst_addr()
    }
}
