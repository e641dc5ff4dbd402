//! Composing and transmitting handshake initiations

use std::time::Duration;

use rand::Rng;

use crate::error::Result;
use crate::peer::Peer;

/// Uniform random delay in `[0, max)` so peers do not retry in lockstep
fn handshake_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

impl Peer {
    /// Send a fresh handshake initiation to the peer's endpoint.
    ///
    /// A failure to build the initiation returns early with no timer armed.
    /// Once a message exists the response timeout is always armed, whether or
    /// not the transmission itself went through.
    pub async fn send_new_handshake(&self) -> Result<()> {
        // a completion still in flight from the previous attempt must not count
        self.signals.handshake_completed.disable();

        let msg = self.device.crypto().create_message_initiation(self)?;

        let mut packet = msg.to_bytes();
        self.device.crypto().add_macs(self, &mut packet);

        let sent = self.send_buffer(&packet).await;
        if sent.is_ok() {
            self.timer_any_authenticated_packet_traversal();
            self.signals.handshake_completed.enable();
        }

        let profile = self.device.profile();
        let jitter = handshake_jitter(profile.handshake_jitter_max);
        self.timers
            .handshake_timeout
            .reset(profile.rekey_timeout + jitter);

        sent
    }
}
