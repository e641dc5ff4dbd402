//! The per-peer timer engine
//!
//! A single task per peer waits on all six timers and four signals at once,
//! handles exactly one ready event per iteration, and runs until the stop
//! signal is broadcast. When several events are ready together the pick is
//! unspecified; every handler tolerates any order.

use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::conn::Endpoint;
use crate::peer::Peer;

/// One ready event out of the engine's multi-way wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    KeepalivePersistent,
    KeepalivePassive,
    ZeroAllKeys,
    NewHandshake,
    HandshakeTimeout,
    HandshakeDeadline,
    Stop,
    HandshakeBegin,
    HandshakeCompleted,
}

impl Peer {
    pub(crate) async fn routine_timer_handler(self: Arc<Self>) {
        tracing::debug!("Routine, timer handler, started for {}", self);

        loop {
            let event = self.next_timer_event().await;
            if self.handle_timer_event(event).await.is_break() {
                break;
            }
        }

        tracing::debug!("Routine, timer handler, stopped for {}", self);
    }

    /// Block until any timer expires or any signal fires
    pub async fn next_timer_event(&self) -> TimerEvent {
        let timers = &self.timers;
        let signals = &self.signals;

        tokio::select! {
            _ = timers.keepalive_persistent.wait() => TimerEvent::KeepalivePersistent,
            _ = timers.keepalive_passive.wait() => TimerEvent::KeepalivePassive,
            _ = timers.zero_all_keys.wait() => TimerEvent::ZeroAllKeys,
            _ = timers.new_handshake.wait() => TimerEvent::NewHandshake,
            _ = timers.handshake_timeout.wait() => TimerEvent::HandshakeTimeout,
            _ = timers.handshake_deadline.wait() => TimerEvent::HandshakeDeadline,
            _ = signals.stop.wait() => TimerEvent::Stop,
            _ = signals.handshake_begin.wait() => TimerEvent::HandshakeBegin,
            _ = signals.handshake_completed.wait() => TimerEvent::HandshakeCompleted,
        }
    }

    /// React to one event. `Break` only for [`TimerEvent::Stop`].
    pub async fn handle_timer_event(&self, event: TimerEvent) -> ControlFlow<()> {
        let profile = self.device.profile();

        match event {
            TimerEvent::KeepalivePersistent => {
                if self.persistent_keepalive_interval().is_some() {
                    tracing::debug!("Sending keep-alive to {}", self);
                    self.send_keepalive();
                }
            }

            TimerEvent::KeepalivePassive => {
                tracing::debug!("Sending keep-alive to {}", self);
                self.send_keepalive();

                if self
                    .timers
                    .need_another_keepalive
                    .swap(false, Ordering::AcqRel)
                {
                    self.timers.keepalive_passive.reset(profile.keepalive_timeout);
                }
            }

            TimerEvent::ZeroAllKeys => {
                tracing::debug!("Clearing all key material for {}", self);
                self.zero_all_keys();
            }

            TimerEvent::NewHandshake => {
                tracing::info!("Retrying handshake with {}", self);
                self.signals.handshake_begin.send();
            }

            TimerEvent::HandshakeTimeout => {
                // the sticky source may be what is breaking the path
                if let Some(endpoint) = self.endpoint.lock().await.as_mut() {
                    endpoint.clear_src();
                }

                if let Err(e) = self.send_new_handshake().await {
                    tracing::info!("Failed to send handshake to {}: {}", self, e);
                }
            }

            TimerEvent::HandshakeDeadline => {
                tracing::info!("Handshake negotiation timed out for {}", self);

                self.signals.flush_nonce_queue.send();
                self.timers.keepalive_persistent.stop();
                self.signals.handshake_begin.enable();
            }

            TimerEvent::Stop => return ControlFlow::Break(()),

            TimerEvent::HandshakeBegin => {
                self.signals.handshake_begin.disable();

                if let Err(e) = self.send_new_handshake().await {
                    tracing::info!("Failed to send handshake to {}: {}", self, e);
                }

                self.timers
                    .handshake_deadline
                    .reset(profile.rekey_attempt_time);
            }

            TimerEvent::HandshakeCompleted => {
                tracing::info!("Handshake completed for {}", self);

                self.timers.handshake_timeout.stop();
                self.timers.handshake_deadline.stop();
                self.signals.handshake_begin.enable();
            }
        }

        ControlFlow::Continue(())
    }

    /// Destroy every key pair and the in-flight handshake.
    /// Handshake lock first, then key pairs.
    pub fn zero_all_keys(&self) {
        let indices = self.device.indices();

        let mut handshake = self.handshake.lock();
        self.keypairs.lock().delete_all(indices);
        handshake.clear(indices);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ProtocolConfig;
    use crate::noise::KeyPair;
    use crate::testing::Harness;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expiry_maps_to_event() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);

        peer.timers().handshake_deadline.reset(Duration::from_secs(3));
        peer.timers().keepalive_passive.reset(Duration::from_secs(1));

        assert_eq!(peer.next_timer_event().await, TimerEvent::KeepalivePassive);
        assert_eq!(peer.next_timer_event().await, TimerEvent::HandshakeDeadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_maps_to_event() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);

        peer.signals().handshake_begin.send();
        assert_eq!(peer.next_timer_event().await, TimerEvent::HandshakeBegin);

        peer.stop();
        assert_eq!(peer.next_timer_event().await, TimerEvent::Stop);
        assert!(peer.handle_timer_event(TimerEvent::Stop).await.is_break());
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_keepalive_rearms_once() {
        init_tracing();
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);

        peer.timer_data_received();
        peer.timer_data_received();
        peer.timers().keepalive_passive.stop();

        let flow = peer.handle_timer_event(TimerEvent::KeepalivePassive).await;
        assert!(flow.is_continue());
        assert_eq!(peer.outbound_len(), 1);
        assert!(peer.timers().keepalive_passive.is_pending());

        peer.timers().keepalive_passive.stop();
        peer.handle_timer_event(TimerEvent::KeepalivePassive).await;
        assert!(!peer.timers().keepalive_passive.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_keepalive_requires_interval() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);

        peer.handle_timer_event(TimerEvent::KeepalivePersistent).await;
        assert_eq!(peer.outbound_len(), 0);

        peer.set_persistent_keepalive_interval(25);
        peer.handle_timer_event(TimerEvent::KeepalivePersistent).await;
        assert_eq!(peer.outbound_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_all_keys_wipes_everything() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);
        let indices = peer.device().indices();

        peer.send_new_handshake().await.unwrap();
        let hs_index = peer.handshake().lock().local_index;
        assert!(indices.contains(hs_index));

        for initiator in [true, true, false] {
            let index = indices.new_index(*peer.public_key()).unwrap();
            indices.swap_for_keypair(index);
            let kp = Arc::new(KeyPair::new([3u8; 32], [4u8; 32], initiator, index, 1));
            if initiator {
                peer.keypairs().install_initiator(kp, indices);
            } else {
                peer.keypairs().install_responder(kp, indices);
            }
        }

        peer.handle_timer_event(TimerEvent::ZeroAllKeys).await;

        assert!(peer.keypairs().lock().is_empty());
        assert!(peer.handshake().lock().is_zeroed());
        assert!(!indices.contains(hs_index));
        assert!(indices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_handshake_timer_requests_begin() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);

        peer.handle_timer_event(TimerEvent::NewHandshake).await;
        assert!(peer.signals().handshake_begin.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_begin_debounces_and_arms_deadline() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);

        peer.handle_timer_event(TimerEvent::HandshakeBegin).await;

        assert_eq!(harness.sent_count(), 1);
        assert!(!peer.signals().handshake_begin.is_enabled());
        assert_eq!(
            peer.timers().handshake_deadline.deadline().unwrap() - tokio::time::Instant::now(),
            Duration::from_secs(90)
        );

        // ignored until re-enabled
        peer.signals().handshake_begin.send();
        assert!(!peer.signals().handshake_begin.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_begin_survives_crypto_failure() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);
        harness
            .crypto
            .fail
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let flow = peer.handle_timer_event(TimerEvent::HandshakeBegin).await;

        assert!(flow.is_continue());
        assert_eq!(harness.sent_count(), 0);
        assert!(!peer.timers().handshake_timeout.is_pending());
        assert!(peer.timers().handshake_deadline.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_clears_source_and_resends() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);
        peer.set_endpoint(Box::new(crate::conn::StdNetEndpoint::with_src(
            "192.0.2.10:51820".parse().unwrap(),
            "10.9.9.9:7000".parse().unwrap(),
        )))
        .await;

        peer.handle_timer_event(TimerEvent::HandshakeTimeout).await;

        let src = peer.with_endpoint(|ep| ep.and_then(|ep| ep.src_ip())).await;
        assert_eq!(src, None);
        assert_eq!(harness.sent_count(), 1);
        assert!(peer.timers().handshake_timeout.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_deadline_gives_up() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(Some(30));
        peer.timer_any_authenticated_packet_traversal();
        peer.signals().handshake_begin.disable();

        peer.handle_timer_event(TimerEvent::HandshakeDeadline).await;

        assert!(peer.signals().flush_nonce_queue.is_pending());
        assert!(!peer.timers().keepalive_persistent.is_pending());
        assert!(peer.signals().handshake_begin.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_completed_stops_retries() {
        let harness = Harness::new(ProtocolConfig::default());
        let peer = harness.peer(None);
        peer.timers().handshake_timeout.reset(Duration::from_secs(5));
        peer.timers().handshake_deadline.reset(Duration::from_secs(90));
        peer.signals().handshake_begin.disable();

        peer.handle_timer_event(TimerEvent::HandshakeCompleted).await;

        assert!(!peer.timers().handshake_timeout.is_pending());
        assert!(!peer.timers().handshake_deadline.is_pending());
        assert!(peer.signals().handshake_begin.is_enabled());
    }
}
