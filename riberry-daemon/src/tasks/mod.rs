//! Worker threads
//!
//! Each worker runs independently and communicates through shared state:
//! telemetry owns the battery filter, the bridge writes external signals,
//! and the display loop reads both.

pub mod bridge;
pub mod display;
pub mod telemetry;

pub use bridge::{BridgeContext, DisconnectedClient};
pub use display::DisplayContext;
pub use telemetry::TelemetryHandle;
