//! Board-agnostic core logic for the Riberry display daemon
//!
//! This crate contains all daemon logic that does not depend on the host
//! operating system or a specific bus implementation:
//!
//! - Battery telemetry filtering (smoothing, outlier rejection, voting)
//! - Scheduler phase selection and per-phase step plans
//! - Sensor traits
//! - Configuration type definitions

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod scheduler;
pub mod telemetry;
pub mod traits;
