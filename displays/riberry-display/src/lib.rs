//! Display session and transport for Riberry companion displays
//!
//! This crate provides:
//! - [`FrameSink`], the single-frame transmit capability, and
//!   [`BusTransport`], which implements it on a locked I2C bus
//! - [`DisplaySession`], which turns status pages, provisioning codes and
//!   images into frames
//! - [`StatusReport`] for composing the status page text
//! - [`ImageEncoder`] and [`SquareJpegEncoder`] for preparing images
//!
//! # Architecture
//!
//! ```text
//! DisplaySession ──► riberry-protocol (FramePacker) ──► FrameSink
//!                                                          │
//!                                     BusTransport: BusLock + I2cBus
//! ```

#![deny(unsafe_code)]

pub mod encoder;
pub mod session;
pub mod status;
pub mod transport;

// Re-export key types
pub use encoder::{EncodeError, ImageEncoder, SquareJpegEncoder};
pub use session::{DisplaySession, ImageReport, ProvisioningTarget, SessionError};
pub use status::{battery_line, StatusReport};
pub use transport::{BusTransport, FrameSink, SendOutcome, TransportFault};
