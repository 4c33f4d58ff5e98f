//! Board identification
//!
//! The display hangs off a different I2C adapter on every supported board,
//! and only some boards carry a battery hat. The board is identified once at
//! startup and everything bus-related is derived from the result.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

const CPUINFO_PATH: &str = "/proc/cpuinfo";
const DEVICE_TREE_MODEL_PATH: &str = "/proc/device-tree/model";

/// Supported host boards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    /// Any Raspberry Pi (matched on `/proc/cpuinfo`)
    RaspberryPi,
    /// Radxa Zero
    RadxaZero,
    /// Khadas VIM4, display on a plain i2c-dev character device
    KhadasVim4,
}

impl DeviceModel {
    /// Human-readable board name
    pub fn name(self) -> &'static str {
        match self {
            DeviceModel::RaspberryPi => "Raspberry Pi",
            DeviceModel::RadxaZero => "Radxa Zero",
            DeviceModel::KhadasVim4 => "Khadas VIM4",
        }
    }

    /// Device node of the bus the display is attached to
    pub fn display_bus(self) -> &'static str {
        match self {
            DeviceModel::RaspberryPi => "/dev/i2c-1",
            DeviceModel::RadxaZero => "/dev/i2c-3",
            DeviceModel::KhadasVim4 => "/dev/i2c-5",
        }
    }

    /// Device node of the battery sensor's bus, if the board has one
    pub fn battery_bus(self) -> Option<&'static str> {
        match self {
            DeviceModel::RaspberryPi => Some("/dev/i2c-1"),
            DeviceModel::RadxaZero => Some("/dev/i2c-3"),
            DeviceModel::KhadasVim4 => None,
        }
    }

    /// Prefix of the Wi-Fi SSID the board advertises while unprovisioned
    pub fn ssid_prefix(self) -> &'static str {
        match self {
            DeviceModel::RaspberryPi => "raspi",
            _ => "radxa",
        }
    }
}

impl core::fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Board identification failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The board is not one the daemon knows how to drive
    #[error("unsupported device model: {0:?}")]
    Unsupported(String),
}

/// Identify the board from `/proc`
pub fn identify_device() -> Result<DeviceModel, ProbeError> {
    identify_from(Path::new(CPUINFO_PATH), Path::new(DEVICE_TREE_MODEL_PATH))
}

/// Identify the board from explicit cpuinfo and device-tree model files
pub fn identify_from(cpuinfo: &Path, model: &Path) -> Result<DeviceModel, ProbeError> {
    let cpuinfo = read_optional(cpuinfo);
    // The device-tree string is NUL-terminated
    let model = read_optional(model).map(|m| m.replace('\0', ""));
    classify(cpuinfo.as_deref(), model.as_deref())
}

/// Decide the board from the contents of the probe files
///
/// `/proc/cpuinfo` is consulted first; the device-tree model only when the
/// CPU is not a Raspberry Pi.
pub fn classify(cpuinfo: Option<&str>, model: Option<&str>) -> Result<DeviceModel, ProbeError> {
    if cpuinfo.is_some_and(|info| info.contains("Raspberry Pi")) {
        return Ok(DeviceModel::RaspberryPi);
    }

    let model = model.map(str::trim).unwrap_or_default();
    match model {
        "Radxa Zero" => Ok(DeviceModel::RadxaZero),
        "Khadas VIM4" => Ok(DeviceModel::KhadasVim4),
        other => Err(ProbeError::Unsupported(other.to_string())),
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            debug!(path = %path.display(), %err, "probe file unreadable");
            None
        }
    }
}
