//! Hardware abstraction traits
//!
//! These traits define the interface between the daemon logic and
//! sensor-specific implementations.

pub mod battery;

pub use battery::{BatterySensor, SensorError};
