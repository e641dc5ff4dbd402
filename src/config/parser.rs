//! WireGuard configuration file parser
//!
//! Parses standard WireGuard `.conf` files with [Interface] and [Peer] sections.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ipnet::IpNet;

use crate::error::ConfigError;
use crate::noise::keys::{NoisePrivateKey, NoisePublicKey, KEY_LEN};

/// Complete WireGuard configuration
#[derive(Debug, Clone)]
pub struct WireGuardConfig {
    /// Interface configuration (our side)
    pub interface: InterfaceConfig,
    /// Peer configurations
    pub peers: Vec<PeerConfig>,
}

/// Interface (local) configuration
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    /// Our static private key
    pub private_key: NoisePrivateKey,
    /// Our VPN addresses with prefix
    pub address: Vec<IpNet>,
    /// DNS servers (optional)
    pub dns: Vec<IpAddr>,
    /// Listen port (optional)
    pub listen_port: Option<u16>,
    /// MTU (optional)
    pub mtu: Option<u16>,
}

/// Peer configuration
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Peer's static public key
    pub public_key: NoisePublicKey,
    /// Pre-shared key (optional, 32 bytes)
    pub preshared_key: Option<[u8; KEY_LEN]>,
    /// Peer's endpoint (IP:port)
    pub endpoint: Option<SocketAddr>,
    /// Allowed IP ranges for this peer
    pub allowed_ips: Vec<IpNet>,
    /// Persistent keep-alive interval in seconds; `None` when disabled
    pub persistent_keepalive: Option<u16>,
}

impl WireGuardConfig {
    /// Parse a WireGuard configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parse a WireGuard configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut interface: Option<InterfaceConfig> = None;
        let mut peers: Vec<PeerConfig> = Vec::new();
        let mut current_section: Option<Section> = None;
        let mut current_peer: Option<PeerBuilder> = None;

        for (line_num, line) in content.lines().enumerate() {
            let line_num = line_num + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.eq_ignore_ascii_case("[interface]") {
                if let Some(peer) = current_peer.take() {
                    peers.push(peer.build()?);
                }
                current_section = Some(Section::Interface);
                continue;
            } else if line.eq_ignore_ascii_case("[peer]") {
                if let Some(peer) = current_peer.take() {
                    peers.push(peer.build()?);
                }
                current_section = Some(Section::Peer);
                current_peer = Some(PeerBuilder::default());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::ParseError {
                    line: line_num,
                    message: format!("Expected 'key = value', got: {}", line),
                });
            };

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match current_section {
                Some(Section::Interface) => {
                    let iface = interface.get_or_insert_with(|| InterfaceConfig {
                        private_key: NoisePrivateKey::default(),
                        address: Vec::new(),
                        dns: Vec::new(),
                        listen_port: None,
                        mtu: None,
                    });

                    match key.as_str() {
                        "privatekey" => {
                            iface.private_key =
                                NoisePrivateKey::from_bytes(parse_key(value, "PrivateKey")?);
                        }
                        "address" => {
                            iface.address.extend(parse_cidr_list(value)?);
                        }
                        "dns" => {
                            for dns_str in value.split(',') {
                                let dns_str = dns_str.trim();
                                let dns: IpAddr =
                                    dns_str.parse().map_err(|_| ConfigError::InvalidAddress {
                                        value: dns_str.to_string(),
                                    })?;
                                iface.dns.push(dns);
                            }
                        }
                        "listenport" => {
                            iface.listen_port = Some(parse_number(value, line_num, "ListenPort")?);
                        }
                        "mtu" => {
                            iface.mtu = Some(parse_number(value, line_num, "MTU")?);
                        }
                        _ => {
                            tracing::debug!("Unknown interface key: {}", key);
                        }
                    }
                }
                Some(Section::Peer) => {
                    let peer = current_peer.as_mut().ok_or(ConfigError::ParseError {
                        line: line_num,
                        message: "Peer value outside of [Peer] section".to_string(),
                    })?;

                    match key.as_str() {
                        "publickey" => {
                            peer.public_key =
                                Some(NoisePublicKey(parse_key(value, "PublicKey")?));
                        }
                        "presharedkey" => {
                            peer.preshared_key = Some(parse_key(value, "PresharedKey")?);
                        }
                        "endpoint" => {
                            peer.endpoint = Some(parse_endpoint(value)?);
                        }
                        "allowedips" => {
                            peer.allowed_ips.extend(parse_cidr_list(value)?);
                        }
                        "persistentkeepalive" => {
                            peer.persistent_keepalive = if value.eq_ignore_ascii_case("off") {
                                None
                            } else {
                                match parse_number::<u16>(value, line_num, "PersistentKeepalive")? {
                                    0 => None,
                                    secs => Some(secs),
                                }
                            };
                        }
                        _ => {
                            tracing::debug!("Unknown peer key: {}", key);
                        }
                    }
                }
                None => {
                    return Err(ConfigError::ParseError {
                        line: line_num,
                        message: "Configuration value outside of any section".to_string(),
                    });
                }
            }
        }

        if let Some(peer) = current_peer.take() {
            peers.push(peer.build()?);
        }

        let interface = interface.ok_or(ConfigError::MissingField {
            field: "[Interface] section".to_string(),
        })?;

        if interface.private_key.is_zero() {
            return Err(ConfigError::MissingField {
                field: "PrivateKey".to_string(),
            });
        }

        Ok(WireGuardConfig { interface, peers })
    }

    /// Get our public key derived from the private key
    pub fn public_key(&self) -> NoisePublicKey {
        self.interface.private_key.public_key()
    }
}

/// Section type during parsing
#[derive(Clone, Copy)]
enum Section {
    Interface,
    Peer,
}

/// Builder for PeerConfig during parsing
#[derive(Default)]
struct PeerBuilder {
    public_key: Option<NoisePublicKey>,
    preshared_key: Option<[u8; KEY_LEN]>,
    endpoint: Option<SocketAddr>,
    allowed_ips: Vec<IpNet>,
    persistent_keepalive: Option<u16>,
}

impl PeerBuilder {
    fn build(self) -> Result<PeerConfig, ConfigError> {
        let public_key = self.public_key.ok_or(ConfigError::MissingField {
            field: "PublicKey in [Peer]".to_string(),
        })?;

        Ok(PeerConfig {
            public_key,
            preshared_key: self.preshared_key,
            endpoint: self.endpoint,
            allowed_ips: self.allowed_ips,
            persistent_keepalive: self.persistent_keepalive,
        })
    }
}

/// Parse a base64-encoded 32-byte key
fn parse_key(value: &str, field_name: &str) -> Result<[u8; KEY_LEN], ConfigError> {
    let bytes = BASE64.decode(value).map_err(|_| ConfigError::InvalidKey {
        field: field_name.to_string(),
    })?;

    bytes.try_into().map_err(|_| ConfigError::InvalidKey {
        field: field_name.to_string(),
    })
}

fn parse_cidr_list(value: &str) -> Result<Vec<IpNet>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>().map_err(|_| ConfigError::InvalidCidr {
                value: s.to_string(),
            })
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    value: &str,
    line: usize,
    field_name: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::ParseError {
        line,
        message: format!("Invalid {}: {}", field_name, value),
    })
}

/// Parse an endpoint (IP:port); hostnames are not resolved here
fn parse_endpoint(value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse::<SocketAddr>().map_err(|_| ConfigError::InvalidAddress {
        value: value.to_string(),
    })
}
