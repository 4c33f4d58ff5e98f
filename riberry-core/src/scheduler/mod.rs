//! Display scheduler
//!
//! Decides what the display shows next from the current external signals
//! and expands each phase into an ordered list of steps.

pub mod phase;

pub use phase::{plan, Phase, Plan, Step, MAX_PLAN_STEPS};
