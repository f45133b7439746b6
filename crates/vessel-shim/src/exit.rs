//! One-shot exit notification.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Fires at most once and wakes every waiter, including ones that arrive
/// after it fired.
#[derive(Debug, Default)]
pub struct ExitSignal {
    fired: AtomicBool,
    notify: Notify,
}

impl ExitSignal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns false if it had already fired.
    pub fn signal(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    /// Whether the signal has fired.
    pub fn is_signaled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait until the signal fires.
    pub async fn wait(&self) {
        loop {
            // Register before checking the flag so a concurrent signal is not missed.
            let notified = self.notify.notified();
            if self.is_signaled() {
                return;
            }
            notified.await;
        }
    }
}
