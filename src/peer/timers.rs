//! Timer and signal set, and the protocol events that arm them
//!
//! Everything here is non-blocking and may be called from the send path, the
//! receive path, or the engine itself. Only the engine waits on the timers.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::event::{Signal, Timer};
use crate::peer::Peer;

/// The six per-peer deadlines
#[derive(Debug, Default)]
pub struct Timers {
    pub keepalive_persistent: Timer,
    pub keepalive_passive: Timer,
    pub new_handshake: Timer,
    pub handshake_timeout: Timer,
    pub handshake_deadline: Timer,
    pub zero_all_keys: Timer,
    /// Data arrived while a passive keep-alive was already armed
    pub(crate) need_another_keepalive: AtomicBool,
    /// Receive-path only; see [`Peer::keep_key_fresh_receiving`]
    pub(crate) send_last_minute_handshake: AtomicBool,
}

/// The four per-peer signals
#[derive(Debug, Default)]
pub struct Signals {
    /// Request a handshake; disabled while an attempt is outstanding
    pub handshake_begin: Signal,
    /// Raised when a handshake completes; disabled until an initiation is on the wire
    pub handshake_completed: Signal,
    /// Ask the outbound pipeline to drop everything queued for this peer
    pub flush_nonce_queue: Signal,
    /// Broadcast once to terminate the engine
    pub stop: Signal,
}

impl Peer {
    /// Called after an authenticated message was sent
    pub fn keep_key_fresh_sending(&self) {
        let Some(keypair) = self.keypairs.current() else {
            return;
        };
        let profile = self.device.profile();
        let nonce = keypair.send_nonce();
        if nonce > profile.rekey_after_messages
            || (keypair.is_initiator() && keypair.age() > profile.rekey_after_time)
        {
            self.signals.handshake_begin.send();
        }
    }

    /// Called after an authenticated message was received.
    ///
    /// Must only be called from the sequential receive path: the check and
    /// the set of the last-minute flag are not atomic with respect to each
    /// other, so two concurrent callers could both trigger.
    pub fn keep_key_fresh_receiving(&self) {
        if self.timers.send_last_minute_handshake.load(Ordering::Relaxed) {
            return;
        }
        let Some(keypair) = self.keypairs.current() else {
            return;
        };
        if !keypair.is_initiator() {
            return;
        }
        let profile = self.device.profile();
        let nonce = keypair.send_nonce();
        if nonce > profile.rekey_after_messages
            || keypair.age() > profile.rekey_after_time_receiving
        {
            // last minute attempt before the key pair is rejected
            self.signals.handshake_begin.send();
            self.timers
                .send_last_minute_handshake
                .store(true, Ordering::Relaxed);
        }
    }

    /// Queue a keep-alive unless packets are already waiting.
    ///
    /// Returns false when nothing could be queued because the queue is full;
    /// the next keep-alive timer firing tries again.
    pub fn send_keepalive(&self) -> bool {
        if self.outbound_len() > 0 {
            // queued packets double as the keep-alive, unless they are backed up
            return self.queue.capacity() > 0;
        }
        let elem = self.device.new_outbound_element();
        self.queue.try_send(elem).is_ok()
    }

    /// Event: sent a non-empty authenticated transport message
    pub fn timer_data_sent(&self) {
        self.timers.keepalive_passive.stop();
        if self.timers.new_handshake.is_pending() {
            self.timers
                .new_handshake
                .reset(self.device.profile().new_handshake_time);
        }
    }

    /// Event: received a non-empty authenticated transport message.
    /// Arms the passive keep-alive, or asks for one more if it is already armed.
    pub fn timer_data_received(&self) {
        if !self
            .timers
            .keepalive_passive
            .start(self.device.profile().keepalive_timeout)
        {
            self.timers
                .need_another_keepalive
                .store(true, Ordering::Release);
        }
    }

    /// Event: any authenticated packet received
    pub fn timer_any_authenticated_packet_received(&self) {
        self.timers.new_handshake.stop();
    }

    /// Event: any authenticated packet sent or received.
    /// Pushes the persistent keep-alive into the future.
    pub fn timer_any_authenticated_packet_traversal(&self) {
        if let Some(interval) = self.persistent_keepalive_interval() {
            self.timers.keepalive_persistent.reset(interval);
        }
    }

    /// Event: a handshake completed, i.e. a valid response was consumed or the
    /// first transport message under the `next` key pair arrived
    pub fn timer_handshake_complete(&self) {
        self.record_handshake_time();
        self.timers
            .send_last_minute_handshake
            .store(false, Ordering::Relaxed);
        self.signals.handshake_completed.send();
        tracing::info!("Negotiated new handshake for {}", self);
    }

    /// Event: an ephemeral key was generated for an initiation or response.
    /// Schedules the wipe of all key material should the handshake never finish.
    pub fn timer_ephemeral_key_created(&self) {
        self.timers
            .zero_all_keys
            .reset(self.device.profile().zero_keys_after());
    }
}
