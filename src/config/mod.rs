//! Configuration
//!
//! - `parser`: standard WireGuard `.conf` files
//! - `profile`: the fixed protocol timing constants

mod parser;
pub mod profile;

pub use parser::{InterfaceConfig, PeerConfig, WireGuardConfig};
pub use profile::ProtocolConfig;
