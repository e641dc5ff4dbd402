//! Transport-facing abstractions
//!
//! The engine never touches sockets directly. It addresses peers through the
//! [`Endpoint`] trait and transmits through a [`Bind`]:
//! - `StdNetEndpoint`: a plain socket address with an optional sticky source
//! - `KeyedEndpoint`: any endpoint tagged with the remote peer's public key
//! - `UdpBind`: a tokio UDP socket

mod keyed_endpoint;

pub use keyed_endpoint::KeyedEndpoint;

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::NetworkError;

/// A remote transport address plus whatever local source the bind pinned for it
pub trait Endpoint: Send + Sync + fmt::Debug {
    /// Forget the local source address so the next send re-resolves it
    fn clear_src(&mut self);

    /// Local source address (ip:port), empty if none is pinned
    fn src_to_string(&self) -> String;

    /// Destination address (ip:port)
    fn dst_to_string(&self) -> String;

    /// Destination bytes used for mac2 cookie calculations
    fn dst_to_bytes(&self) -> Vec<u8>;

    fn dst_ip(&self) -> IpAddr;

    fn src_ip(&self) -> Option<IpAddr>;

    /// Destination socket address handed to the bind
    fn dst_addr(&self) -> SocketAddr;
}

/// Endpoint backed by a standard socket address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdNetEndpoint {
    dst: SocketAddr,
    src: Option<SocketAddr>,
}

impl StdNetEndpoint {
    pub fn new(dst: SocketAddr) -> Self {
        Self { dst, src: None }
    }

    pub fn with_src(dst: SocketAddr, src: SocketAddr) -> Self {
        Self {
            dst,
            src: Some(src),
        }
    }
}

impl Endpoint for StdNetEndpoint {
    fn clear_src(&mut self) {
        self.src = None;
    }

    fn src_to_string(&self) -> String {
        self.src.map(|src| src.to_string()).unwrap_or_default()
    }

    fn dst_to_string(&self) -> String {
        self.dst.to_string()
    }

    fn dst_to_bytes(&self) -> Vec<u8> {
        let mut out = match self.dst.ip() {
            IpAddr::V4(ip) => ip.octets().to_vec(),
            IpAddr::V6(ip) => ip.octets().to_vec(),
        };
        out.extend_from_slice(&self.dst.port().to_le_bytes());
        out
    }

    fn dst_ip(&self) -> IpAddr {
        self.dst.ip()
    }

    fn src_ip(&self) -> Option<IpAddr> {
        self.src.map(|src| src.ip())
    }

    fn dst_addr(&self) -> SocketAddr {
        self.dst
    }
}

/// Datagram transport used to send handshake and keep-alive traffic
#[async_trait]
pub trait Bind: Send + Sync {
    async fn send(&self, buf: &[u8], endpoint: &dyn Endpoint) -> Result<(), NetworkError>;
}

/// Bind over a single tokio UDP socket
#[derive(Debug)]
pub struct UdpBind {
    socket: UdpSocket,
}

impl UdpBind {
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| NetworkError::BindFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Bind for UdpBind {
    async fn send(&self, buf: &[u8], endpoint: &dyn Endpoint) -> Result<(), NetworkError> {
        let sent = self
            .socket
            .send_to(buf, endpoint.dst_addr())
            .await
            .map_err(|e| NetworkError::SendFailed {
                reason: e.to_string(),
            })?;
        if sent != buf.len() {
            return Err(NetworkError::SendFailed {
                reason: format!("short write: {} of {} bytes", sent, buf.len()),
            });
        }
        Ok(())
    }
}
