//! Sensor drivers

pub mod pisugar;

pub use pisugar::{PiSugarSensor, PISUGAR_ADDRESS};
