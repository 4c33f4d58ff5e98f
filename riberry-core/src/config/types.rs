//! Configuration type definitions
//!
//! These types represent the daemon configuration. The daemon ships a
//! default file and accepts an override on the command line; any key left
//! out takes the default below.

use heapless::String;

use crate::telemetry::FilterConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum length of a filesystem path in the config
pub const MAX_PATH_LEN: usize = 64;

/// Maximum length of a short label or identifier
pub const MAX_LABEL_LEN: usize = 32;

/// Maximum length of a topic or parameter name
pub const MAX_TOPIC_LEN: usize = 64;

fn text<const N: usize>(value: &str) -> String<N> {
    let mut out = String::new();
    // Defaults are compile-time literals well under every capacity
    let _ = out.push_str(value);
    out
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct DaemonConfig {
    /// Display link
    pub display: DisplayConfig,
    /// Battery sampling and filtering
    pub battery: BatteryConfig,
    /// Scheduler timing
    pub scheduler: SchedulerConfig,
    /// Network probes
    pub network: NetworkConfig,
    /// Control-system bridge
    pub bridge: BridgeConfig,
}

/// Display link and page layout
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct DisplayConfig {
    /// 7-bit bus address of the display
    pub address: u8,
    /// Lock file shared with other bus users
    pub lock_path: String<MAX_PATH_LEN>,
    /// How long to wait for the bus lock before skipping a frame
    pub lock_timeout_ms: u32,
    /// Pause after every image frame so the receiver can keep up
    pub frame_delay_ms: u32,
    /// Edge length of the square image sent to the display
    pub image_size: u32,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
    /// Port of the onboarding web page
    pub onboarding_port: u16,
    /// Path of the onboarding web page
    pub onboarding_path: String<MAX_LABEL_LEN>,
    /// Label printed above the control endpoint
    pub endpoint_label: String<MAX_LABEL_LEN>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            address: 0x42,
            lock_path: text("/tmp/i2c-1.lock"),
            lock_timeout_ms: 10_000,
            frame_delay_ms: 5,
            image_size: 128,
            jpeg_quality: 75,
            onboarding_port: 8085,
            onboarding_path: text("/riberry_startup/"),
            endpoint_label: text("ROS_MASTER"),
        }
    }
}

/// Battery sensor sampling and filter tuning
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct BatteryConfig {
    /// Sample the battery at all (boards without a battery hat never do)
    pub enabled: bool,
    /// 7-bit bus address of the fuel gauge
    pub address: u8,
    /// Interval between samples
    pub sample_period_ms: u32,
    /// Weight of the newest sample in the moving average
    pub alpha: f32,
    /// Difference above which a history entry disagrees with a sample
    pub outlier_threshold: u32,
    /// Fraction of disagreeing entries that marks a sample as an outlier
    pub outlier_ratio: f32,
    /// At or below this percentage the battery line turns red
    pub low_percentage: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        let filter = FilterConfig::default();
        Self {
            enabled: true,
            address: 0x57,
            sample_period_ms: 200,
            alpha: filter.alpha,
            outlier_threshold: filter.outlier_threshold,
            outlier_ratio: filter.outlier_ratio,
            low_percentage: 20.0,
        }
    }
}

impl BatteryConfig {
    /// Filter tuning derived from this section
    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            alpha: self.alpha,
            outlier_threshold: self.outlier_threshold,
            outlier_ratio: self.outlier_ratio,
        }
    }
}

/// Scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct SchedulerConfig {
    /// Pause after each provisioning or status page
    pub phase_pause_ms: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            phase_pause_ms: 3000,
        }
    }
}

/// Host network probes
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct NetworkConfig {
    /// Remote socket address used to discover the outbound interface address
    pub probe_target: String<MAX_LABEL_LEN>,
    /// Wireless interface whose hardware address names the hotspot
    pub wireless_interface: String<MAX_LABEL_LEN>,
    /// Environment variable holding the control endpoint URI
    pub endpoint_env: String<MAX_LABEL_LEN>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_target: text("8.8.8.8:80"),
            wireless_interface: text("wlan0"),
            endpoint_env: text("ROS_MASTER_URI"),
        }
    }
}

/// Control-system bridge
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct BridgeConfig {
    /// Run the bridge thread
    pub enabled: bool,
    /// Pause before reconnecting after a session ends
    pub reconnect_backoff_ms: u32,
    /// Interval of the parameter poll and battery publish
    pub poll_interval_ms: u32,
    /// Destination used to find the routable host address
    pub route_probe_host: String<MAX_LABEL_LEN>,
    /// Route lookups before giving up on a host address
    pub route_attempts: u16,
    /// Pause between route lookups
    pub route_retry_ms: u32,
    /// Free-text topic shown below the status page
    pub annotation_topic: String<MAX_TOPIC_LEN>,
    /// Parameter naming the image topic to mirror
    pub image_topic_param: String<MAX_TOPIC_LEN>,
    /// Topic the filtered battery percentage is published on
    pub battery_topic: String<MAX_TOPIC_LEN>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_backoff_ms: 5000,
            poll_interval_ms: 1000,
            route_probe_host: text("8.8.8.8"),
            route_attempts: 300,
            route_retry_ms: 1000,
            annotation_topic: text("/atom_s3_additional_info"),
            image_topic_param: text("/display_image"),
            battery_topic: text("/pisugar_battery"),
        }
    }
}

/// Configuration value out of range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Bus address outside the 7-bit range
    InvalidAddress,
    /// JPEG quality outside 1-100
    InvalidQuality,
    /// Image edge length of zero
    InvalidImageSize,
    /// Smoothing weight outside (0, 1]
    InvalidAlpha,
    /// Outlier ratio outside [0, 1]
    InvalidRatio,
    /// A period or timeout of zero where one is required
    InvalidPeriod,
}

impl DaemonConfig {
    /// Check value ranges that the type system does not
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.address > 0x7F || self.battery.address > 0x7F {
            return Err(ConfigError::InvalidAddress);
        }
        if !(1..=100).contains(&self.display.jpeg_quality) {
            return Err(ConfigError::InvalidQuality);
        }
        if self.display.image_size == 0 {
            return Err(ConfigError::InvalidImageSize);
        }
        if !(self.battery.alpha > 0.0 && self.battery.alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha);
        }
        if !(0.0..=1.0).contains(&self.battery.outlier_ratio) {
            return Err(ConfigError::InvalidRatio);
        }
        if self.battery.sample_period_ms == 0
            || self.bridge.poll_interval_ms == 0
            || self.display.lock_timeout_ms == 0
        {
            return Err(ConfigError::InvalidPeriod);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.display.address, 0x42);
        assert_eq!(config.display.lock_path.as_str(), "/tmp/i2c-1.lock");
        assert_eq!(config.display.lock_timeout_ms, 10_000);
        assert_eq!(config.battery.address, 0x57);
        assert_eq!(config.battery.outlier_threshold, 1000);
        assert_eq!(config.scheduler.phase_pause_ms, 3000);
        assert_eq!(config.bridge.route_attempts, 300);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_battery_section_builds_filter() {
        let battery = BatteryConfig {
            alpha: 0.5,
            outlier_threshold: 15,
            ..BatteryConfig::default()
        };
        let filter = battery.filter();
        assert_eq!(filter.alpha, 0.5);
        assert_eq!(filter.outlier_threshold, 15);
        assert_eq!(filter.outlier_ratio, 0.4);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DaemonConfig::default();
        config.display.address = 0x80;
        assert_eq!(config.validate(), Err(ConfigError::InvalidAddress));

        let mut config = DaemonConfig::default();
        config.display.jpeg_quality = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidQuality));

        let mut config = DaemonConfig::default();
        config.battery.alpha = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidAlpha));

        let mut config = DaemonConfig::default();
        config.battery.sample_period_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPeriod));
    }
}
