//! Bus transport
//!
//! Sends one finished frame to the display while holding the cross-process
//! bus lock. Nothing here retries: a frame that cannot be delivered is
//! reported and dropped, and the next page simply replaces it.

use std::time::Duration;

use riberry_hal::{BusErrorKind, BusLock, I2cBus, I2cError, LockError};
use tracing::{debug, trace, warn};

/// Why a frame was not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    /// Another process held the bus lock past the timeout
    LockTimeout,
    /// The lock file could not be opened or locked
    LockFailed,
    /// The bus write failed
    BusFault(BusErrorKind),
    /// The bus write timed out
    TransportTimeout,
}

/// Result of one frame transmission
///
/// Faults are expected in normal operation (the display may be rebooting,
/// another process may hold the bus), so they are an outcome rather than
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame was written to the bus
    Sent,
    /// The frame was dropped
    Skipped(TransportFault),
}

impl SendOutcome {
    /// Whether the frame reached the bus
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// Something that can deliver a whole frame to a bus address
pub trait FrameSink {
    /// Transmit `frame` to the device at `address`
    fn send(&mut self, address: u8, frame: &[u8]) -> SendOutcome;
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn send(&mut self, address: u8, frame: &[u8]) -> SendOutcome {
        (**self).send(address, frame)
    }
}

/// [`FrameSink`] over an I2C bus guarded by a [`BusLock`]
pub struct BusTransport<B, L> {
    bus: B,
    lock: L,
    lock_timeout: Duration,
}

impl<B: I2cBus, L: BusLock> BusTransport<B, L> {
    /// Create a transport that waits up to `lock_timeout` for the lock
    pub fn new(bus: B, lock: L, lock_timeout: Duration) -> Self {
        Self {
            bus,
            lock,
            lock_timeout,
        }
    }

    /// Tear down, returning the bus and lock
    pub fn into_parts(self) -> (B, L) {
        (self.bus, self.lock)
    }
}

impl<B: I2cBus, L: BusLock> FrameSink for BusTransport<B, L> {
    fn send(&mut self, address: u8, frame: &[u8]) -> SendOutcome {
        let guard = match self.lock.acquire(self.lock_timeout) {
            Ok(guard) => guard,
            Err(LockError::Timeout) => {
                warn!(
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "bus lock busy, frame skipped"
                );
                return SendOutcome::Skipped(TransportFault::LockTimeout);
            }
            Err(LockError::Unavailable) => {
                warn!("bus lock unavailable, frame skipped");
                return SendOutcome::Skipped(TransportFault::LockFailed);
            }
        };

        let result = self.bus.write(address, frame);
        drop(guard);

        match result {
            Ok(()) => {
                trace!(address, len = frame.len(), "frame sent");
                SendOutcome::Sent
            }
            Err(err) => {
                let kind = err.kind();
                let fault = match kind {
                    BusErrorKind::Timeout => TransportFault::TransportTimeout,
                    kind => TransportFault::BusFault(kind),
                };
                // A rebooting display NACKs for a while; don't flood the log
                if kind.is_transient() {
                    debug!(address, len = frame.len(), ?fault, error = ?err, "frame not delivered");
                } else {
                    warn!(address, len = frame.len(), ?fault, error = ?err, "frame not delivered");
                }
                SendOutcome::Skipped(fault)
            }
        }
    }
}
