//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in riberry-core for the peripherals found next to the display:
//!
//! - Battery fuel gauges (PiSugar)

#![no_std]
#![deny(unsafe_code)]

pub mod sensor;
