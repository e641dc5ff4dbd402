//! Route-change listener hook
//!
//! On route changes the bind's sticky sources go stale. Watching the routing
//! table is platform code this crate does not carry: every target gets a stub
//! that starts nothing, and the device falls back to clearing a peer's source
//! address when its handshakes time out.

use crate::conn::Bind;
use crate::device::Device;
use crate::error::NetworkError;

/// Handle to a running route listener; dropping it stops the listener
#[derive(Debug)]
pub struct RouteListener {
    _private: (),
}

impl Device {
    #[cfg(not(target_os = "linux"))]
    pub fn start_route_listener(
        &self,
        _bind: &dyn Bind,
    ) -> Result<Option<RouteListener>, NetworkError> {
        Ok(None)
    }

    #[cfg(target_os = "linux")]
    pub fn start_route_listener(
        &self,
        _bind: &dyn Bind,
    ) -> Result<Option<RouteListener>, NetworkError> {
        tracing::debug!("Route listener not available, relying on handshake timeouts");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ProtocolConfig;
    use crate::testing::Harness;

    #[test]
    fn test_stub_starts_nothing() {
        let harness = Harness::new(ProtocolConfig::default());

        let listener = harness
            .device
            .start_route_listener(harness.bind.as_ref())
            .unwrap();
        assert!(listener.is_none());
    }
}
