//! Riberry Hardware Abstraction Layer
//!
//! Traits for the two hardware resources the daemon shares between its
//! workers: the I2C bus and the lock that serializes access to it across
//! processes. Board-specific implementations live in `riberry-hal-linux`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  riberry-daemon / riberry-display       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  riberry-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  riberry-hal-linux (i2c-dev, flock)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`i2c::I2cBus`] - I2C master operations
//! - [`lock::BusLock`] - Exclusive access to a bus shared with other processes

#![no_std]
#![deny(unsafe_code)]

pub mod i2c;
pub mod lock;

pub use i2c::{BusErrorKind, I2cBus, I2cError};
pub use lock::{BusLock, LockError};
