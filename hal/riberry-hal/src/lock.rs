//! Cross-process bus locking
//!
//! The display bus is shared with other programs on the host, so every
//! multi-byte transfer must hold an exclusive lock for its whole duration.

use core::time::Duration;

/// Failure to obtain a [`BusLock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockError {
    /// Another holder kept the lock past the timeout
    Timeout,
    /// The lock itself could not be opened or queried
    Unavailable,
}

/// Exclusive, time-bounded access to a shared bus
///
/// The lock is held for as long as the returned guard lives and released
/// when it is dropped.
pub trait BusLock {
    /// Proof of ownership; dropping it releases the lock
    type Guard<'a>
    where
        Self: 'a;

    /// Wait up to `timeout` for the lock
    fn acquire(&self, timeout: Duration) -> Result<Self::Guard<'_>, LockError>;
}
