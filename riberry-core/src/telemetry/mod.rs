//! Battery telemetry
//!
//! Pure filtering logic. The sampling loop that feeds it lives in the
//! daemon, which owns the sensor and the timing.

pub mod filter;

pub use filter::{
    is_outlier, majority_vote, BatteryFilter, BatterySample, FilterConfig, SampleOutcome,
    TelemetrySnapshot, HISTORY_LEN,
};
