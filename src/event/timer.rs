//! Resettable one-shot deadline timer
//!
//! Armed from any task, consumed by exactly one: the peer's timer engine.
//! `wait` is cancel safe so it can sit in a `select!` alongside the other
//! timers and signals and be rebuilt every iteration.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct Timer {
    deadline: Mutex<Option<Instant>>,
    notify: Notify,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the timer unless it is armed already, counting an expired deadline
    /// the engine has not consumed yet. Returns true if this call armed it.
    pub fn start(&self, duration: Duration) -> bool {
        let mut deadline = self.lock();
        if deadline.is_some() {
            return false;
        }
        *deadline = Some(Instant::now() + duration);
        drop(deadline);
        self.notify.notify_one();
        true
    }

    /// Rearm, replacing any pending deadline
    pub fn reset(&self, duration: Duration) {
        *self.lock() = Some(Instant::now() + duration);
        self.notify.notify_one();
    }

    /// Cancel the pending deadline, if any
    pub fn stop(&self) {
        if self.lock().take().is_some() {
            self.notify.notify_one();
        }
    }

    /// Armed and not yet expired
    pub fn is_pending(&self) -> bool {
        self.lock().is_some_and(|at| at > Instant::now())
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.lock()
    }

    /// Resolve when the current deadline elapses, disarming the timer
    pub async fn wait(&self) {
        loop {
            let rearmed = self.notify.notified();
            match self.deadline() {
                None => rearmed.await,
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            if self.fire_if_due() {
                                return;
                            }
                        }
                        _ = rearmed => {}
                    }
                }
            }
        }
    }

    fn fire_if_due(&self) -> bool {
        let mut deadline = self.lock();
        match *deadline {
            Some(at) if at <= Instant::now() => {
                *deadline = None;
                true
            }
            _ => false,
        }
    }
}
