//! Protocol timing profile
//!
//! Fixed WireGuard durations and counters that drive every per-peer timer.

use std::time::Duration;

/// Initiate a rekey once this many messages were sent under one key pair
pub const REKEY_AFTER_MESSAGES: u64 = 1 << 60;

/// Initiate rekey after this long
pub const REKEY_AFTER_TIME: Duration = Duration::from_secs(120);

/// Reject packets from key pairs older than this
pub const REJECT_AFTER_TIME: Duration = Duration::from_secs(180);

/// Give up on a handshake after retrying for this long
pub const REKEY_ATTEMPT_TIME: Duration = Duration::from_secs(90);

/// Retry an unanswered initiation after this long
pub const REKEY_TIMEOUT: Duration = Duration::from_secs(5);

/// Send a passive keep-alive if nothing was sent within this time
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound (exclusive) on the random jitter added to REKEY_TIMEOUT
pub const HANDSHAKE_JITTER_MAX: Duration = Duration::from_millis(334);

/// Outbound packets that may wait for a key pair
pub const OUTBOUND_QUEUE_SIZE: usize = 1024;

/// Immutable timing profile a device is built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub rekey_after_messages: u64,
    pub rekey_after_time: Duration,
    /// Receive-side threshold: last point at which the initiator can still
    /// complete a handshake before the key pair is rejected
    pub rekey_after_time_receiving: Duration,
    pub reject_after_time: Duration,
    pub rekey_attempt_time: Duration,
    pub rekey_timeout: Duration,
    pub keepalive_timeout: Duration,
    /// How long data may go unanswered before a fresh handshake is forced
    pub new_handshake_time: Duration,
    pub handshake_jitter_max: Duration,
    pub outbound_queue_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            rekey_after_messages: REKEY_AFTER_MESSAGES,
            rekey_after_time: REKEY_AFTER_TIME,
            rekey_after_time_receiving: REJECT_AFTER_TIME - KEEPALIVE_TIMEOUT - REKEY_TIMEOUT,
            reject_after_time: REJECT_AFTER_TIME,
            rekey_attempt_time: REKEY_ATTEMPT_TIME,
            rekey_timeout: REKEY_TIMEOUT,
            keepalive_timeout: KEEPALIVE_TIMEOUT,
            new_handshake_time: KEEPALIVE_TIMEOUT + REKEY_TIMEOUT,
            handshake_jitter_max: HANDSHAKE_JITTER_MAX,
            outbound_queue_size: OUTBOUND_QUEUE_SIZE,
        }
    }
}

impl ProtocolConfig {
    /// Lifetime of unconfirmed handshake material before it is wiped
    pub fn zero_keys_after(&self) -> Duration {
        self.reject_after_time * 3
    }

    /// Same profile with a different outbound queue depth
    pub fn with_outbound_queue_size(mut self, size: usize) -> Self {
        self.outbound_queue_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_durations() {
        let profile = ProtocolConfig::default();

        assert_eq!(profile.rekey_after_time_receiving, Duration::from_secs(165));
        assert_eq!(profile.new_handshake_time, Duration::from_secs(15));
        assert_eq!(profile.zero_keys_after(), Duration::from_secs(540));
        assert_eq!(profile.rekey_after_messages, 1 << 60);
    }

    #[test]
    fn test_queue_size_floor() {
        let profile = ProtocolConfig::default().with_outbound_queue_size(0);
        assert_eq!(profile.outbound_queue_size, 1);
    }
}
