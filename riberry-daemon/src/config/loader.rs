//! Configuration loader
//!
//! Parses `riberry.toml` into [`DaemonConfig`]. Keys missing from a file
//! take their defaults; unknown keys are rejected so typos surface at
//! startup instead of silently doing nothing.

use std::fs;
use std::path::{Path, PathBuf};

use riberry_core::config::{ConfigError as RangeError, DaemonConfig};
use thiserror::Error;
use tracing::{debug, info};

use crate::EMBEDDED_CONFIG;

/// Configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML or does not match the schema
    #[error("cannot parse {origin}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    /// A value is out of range
    #[error("invalid value in {origin}: {reason:?}")]
    Invalid { origin: String, reason: RangeError },
}

/// Load the file at `path`, or the embedded default when `None`
pub fn load(path: Option<&Path>) -> Result<DaemonConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            parse(&text, &path.display().to_string())?
        }
        None => parse(EMBEDDED_CONFIG, "embedded riberry.toml")?,
    };

    info!(
        source = %path.map_or_else(|| "embedded".into(), |p| p.display().to_string()),
        "configuration loaded"
    );
    log_config_summary(&config);
    Ok(config)
}

/// Parse and validate configuration text; `origin` names it in errors
pub fn parse(text: &str, origin: &str) -> Result<DaemonConfig, ConfigError> {
    let config: DaemonConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })?;
    config.validate().map_err(|reason| ConfigError::Invalid {
        origin: origin.to_string(),
        reason,
    })?;
    Ok(config)
}

fn log_config_summary(config: &DaemonConfig) {
    debug!(
        address = config.display.address,
        lock = %config.display.lock_path,
        "display"
    );
    debug!(
        enabled = config.battery.enabled,
        period_ms = config.battery.sample_period_ms,
        "battery"
    );
    debug!(enabled = config.bridge.enabled, "bridge");
}
