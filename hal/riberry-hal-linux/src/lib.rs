//! Linux HAL for the Riberry daemon
//!
//! This crate provides Linux implementations of the shared `riberry-hal`
//! traits, plus host-specific functionality:
//!
//! - Board identification from `/proc` ([`probe`])
//! - I2C bus variants selected per board ([`bus`])
//! - Cross-process bus lock on a lock file ([`lock`])

#![deny(unsafe_code)]

pub mod bus;
pub mod lock;
pub mod probe;

pub use bus::{CharDeviceBus, LinuxBusError, PeripheralBus};
pub use lock::{FileLock, FileLockGuard};
pub use probe::{identify_device, DeviceModel, ProbeError};

// Re-export shared traits from riberry-hal for convenience
pub use riberry_hal::{BusErrorKind, BusLock, I2cBus, I2cError, LockError};
