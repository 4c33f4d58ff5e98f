//! Status page text
//!
//! The display renders status text line by line and understands a small set
//! of ANSI SGR color sequences.

use std::net::IpAddr;

use riberry_core::telemetry::TelemetrySnapshot;

const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[39m";

/// Everything shown on the status page
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport<'a> {
    /// Host name
    pub hostname: &'a str,
    /// Outbound interface address, if the host is online
    pub address: Option<IpAddr>,
    /// Label printed above the control endpoint
    pub endpoint_label: &'a str,
    /// Control endpoint host, if configured
    pub endpoint: Option<&'a str>,
    /// Battery state; `None` on boards without a battery
    pub battery: Option<TelemetrySnapshot>,
    /// At or below this percentage the battery reads red
    pub low_percentage: f32,
    /// Free text pushed by the control system
    pub annotation: Option<&'a str>,
}

impl StatusReport<'_> {
    /// Render the page
    ///
    /// ```text
    /// {host}:
    /// {address | no connection}
    /// {label}:
    /// {endpoint | none}
    /// {battery line}
    /// {annotation}        (only when present)
    /// ```
    pub fn compose(&self) -> String {
        let address = match self.address {
            Some(address) => address.to_string(),
            None => String::from("no connection"),
        };
        let mut text = format!(
            "{}:\n{YELLOW}{address}{RESET}\n{}:\n{RED}{}{RESET}\n",
            self.hostname,
            self.endpoint_label,
            self.endpoint.unwrap_or("none")
        );
        if let Some(snapshot) = self.battery {
            text.push_str(&battery_line(snapshot, self.low_percentage));
        }
        text.push('\n');
        if let Some(annotation) = self.annotation {
            text.push_str(annotation);
            text.push('\n');
        }
        text
    }
}

/// `Bat: {pct}%` colored by level, followed by `+`, `-` or `?` for
/// charging, discharging or not yet known
pub fn battery_line(snapshot: TelemetrySnapshot, low_percentage: f32) -> String {
    let color = if snapshot.percentage <= low_percentage {
        RED
    } else {
        GREEN
    };
    let sign = match snapshot.charging {
        Some(true) => '+',
        Some(false) => '-',
        None => '?',
    };
    // Truncated, not rounded
    let percentage = snapshot.percentage as i32;
    format!("Bat: {color}{percentage}%{RESET}{sign}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn report() -> StatusReport<'static> {
        StatusReport {
            hostname: "riberry",
            address: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))),
            endpoint_label: "ROS_MASTER",
            endpoint: Some("192.168.1.2"),
            battery: Some(TelemetrySnapshot {
                percentage: 87.6,
                charging: Some(true),
            }),
            low_percentage: 20.0,
            annotation: None,
        }
    }

    #[test]
    fn test_full_status_page() {
        assert_eq!(
            report().compose(),
            "riberry:\n\x1b[33m192.168.1.20\x1b[39m\nROS_MASTER:\n\x1b[31m192.168.1.2\x1b[39m\n\
             Bat: \x1b[32m87%\x1b[39m+\n"
        );
    }

    #[test]
    fn test_offline_without_battery() {
        let status = StatusReport {
            address: None,
            endpoint: None,
            battery: None,
            ..report()
        };
        assert_eq!(
            status.compose(),
            "riberry:\n\x1b[33mno connection\x1b[39m\nROS_MASTER:\n\x1b[31mnone\x1b[39m\n\n"
        );
    }

    #[test]
    fn test_ipv6_address_line() {
        let status = StatusReport {
            address: Some("fd00::20".parse().unwrap()),
            ..report()
        };
        assert!(status
            .compose()
            .starts_with("riberry:\n\x1b[33mfd00::20\x1b[39m\nROS_MASTER:\n"));
    }

    #[test]
    fn test_annotation_appended() {
        let status = StatusReport {
            annotation: Some("recording"),
            ..report()
        };
        assert!(status.compose().ends_with("+\nrecording\n"));
    }

    #[test]
    fn test_battery_line_colors_and_signs() {
        let low = TelemetrySnapshot {
            percentage: 20.0,
            charging: Some(false),
        };
        assert_eq!(battery_line(low, 20.0), "Bat: \x1b[31m20%\x1b[39m-");

        let unknown = TelemetrySnapshot {
            percentage: 20.5,
            charging: None,
        };
        assert_eq!(battery_line(unknown, 20.0), "Bat: \x1b[32m20%\x1b[39m?");
    }
}
