//! Coalescing, level-triggered event signal
//!
//! A signal is in one of three states: disabled, enabled and idle, or enabled
//! with a fire pending. Any number of `send` calls made before the consumer
//! wakes collapse into a single firing, and while disabled `send` is dropped.
//! `broadcast` closes the signal for good: every current and future `wait`
//! resolves immediately.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::Notify;

const DISABLED: u8 = 0;
const IDLE: u8 = 1;
const FIRING: u8 = 2;

#[derive(Debug)]
pub struct Signal {
    state: AtomicU8,
    closed: AtomicBool,
    notify: Notify,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    /// Create an enabled, idle signal
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Accept future sends. A pending fire survives re-enabling.
    pub fn enable(&self) {
        let _ = self
            .state
            .compare_exchange(DISABLED, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Drop any pending fire and ignore sends until re-enabled
    pub fn disable(&self) {
        self.state.store(DISABLED, Ordering::Release);
    }

    /// Fire the signal; a no-op while disabled or already pending
    pub fn send(&self) {
        if self
            .state
            .compare_exchange(IDLE, FIRING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.notify.notify_one();
        }
    }

    /// Close the signal: all waiters resolve now and forever after
    pub fn broadcast(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_enabled(&self) -> bool {
        self.state.load(Ordering::Acquire) != DISABLED
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRING
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve once the signal fires, consuming the pending fire.
    /// Cancel safe: a fire is only consumed by the poll that returns ready.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.try_consume() {
                return;
            }
            notified.await;
        }
    }

    fn try_consume(&self) -> bool {
        self.is_closed()
            || self
                .state
                .compare_exchange(FIRING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn fired(signal: &Signal) -> bool {
        tokio::time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .is_ok()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_coalesce() {
        let signal = Signal::new();
        signal.send();
        signal.send();
        signal.send();

        assert!(signal.is_pending());
        assert!(fired(&signal).await);
        assert!(!fired(&signal).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_drops_sends() {
        let signal = Signal::new();
        signal.disable();
        signal.send();
        signal.send();
        assert!(!signal.is_pending());

        signal.enable();
        signal.send();

        assert!(fired(&signal).await);
        assert!(!fired(&signal).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_clears_pending_fire() {
        let signal = Signal::new();
        signal.send();
        signal.disable();

        assert!(!signal.is_enabled());
        assert!(!fired(&signal).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wakes_blocked_waiter() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::task::yield_now().await;

        signal.send();
        waiter.await.unwrap();
        assert!(!signal.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_releases_every_waiter() {
        let signal = Arc::new(Signal::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();
        tokio::task::yield_now().await;

        signal.broadcast();
        for waiter in waiters {
            waiter.await.unwrap();
        }

        // Stays closed
        assert!(fired(&signal).await);
        assert!(fired(&signal).await);
    }
}
