//! Cooperative cancellation
//!
//! Every worker thread gets a clone of one [`ShutdownToken`] at spawn. The
//! token is checked at loop boundaries and every pause waits on it, so a
//! signal interrupts a 3 s page pause instead of waiting it out.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared cancellation flag with interruptible sleeps
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every sleeper
    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        wake.notify_all();
    }

    /// Whether shutdown was requested
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns `true` if the token is cancelled, whether before or during
    /// the sleep.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let (flag, wake) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = wake
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// [`sleep`](Self::sleep) in milliseconds
    pub fn sleep_ms(&self, ms: u32) -> bool {
        self.sleep(Duration::from_millis(u64::from(ms)))
    }
}
