//! Scheduler phases and step plans

use heapless::Vec;

use crate::config::SchedulerConfig;

/// Longest plan any phase expands to
pub const MAX_PLAN_STEPS: usize = 4;

/// What the display loop is doing this iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No network address yet; show the Wi-Fi join code
    AwaitNetwork,
    /// A remote frame source is active; mirror its latest frame
    StreamExternalFrame,
    /// Online; alternate the status page and the onboarding URL
    ReportStatus,
}

impl Phase {
    /// Pick the phase for this iteration
    ///
    /// An external frame wins over everything else, so streaming continues
    /// even while the host has no address.
    pub fn select(frame_ready: bool, network_up: bool) -> Self {
        if frame_ready {
            Phase::StreamExternalFrame
        } else if !network_up {
            Phase::AwaitNetwork
        } else {
            Phase::ReportStatus
        }
    }
}

/// One action of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Send the latest external frame
    ShowImage,
    /// Send the Wi-Fi join code for the unprovisioned host
    ShowWifiCode,
    /// Send the status page
    ShowStatus,
    /// Send the onboarding URL as a provisioning code
    ShowOnboardingUrl,
    /// Pause; interrupted by shutdown
    Wait {
        /// Pause length in milliseconds
        ms: u32,
    },
}

/// Ordered steps of one scheduler iteration
pub type Plan = Vec<Step, MAX_PLAN_STEPS>;

/// Expand a phase into its steps
///
/// Streaming has no pause so frames follow each other as fast as the bus
/// allows.
pub fn plan(phase: Phase, config: &SchedulerConfig) -> Plan {
    let pause = Step::Wait {
        ms: config.phase_pause_ms,
    };

    let steps: &[Step] = match phase {
        Phase::StreamExternalFrame => &[Step::ShowImage],
        Phase::AwaitNetwork => &[Step::ShowWifiCode, pause],
        Phase::ReportStatus => &[Step::ShowStatus, pause, Step::ShowOnboardingUrl, pause],
    };

    // Every arm above fits MAX_PLAN_STEPS
    Vec::from_slice(steps).unwrap_or_default()
}
