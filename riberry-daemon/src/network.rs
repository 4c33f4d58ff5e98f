//! Host network probes
//!
//! Everything the display needs to know about the host's network identity.
//! Probes never fail: a missing address is a normal state that selects the
//! provisioning phase.

use std::fs;
use std::net::{IpAddr, UdpSocket};
use std::process::Command;

use riberry_core::config::NetworkConfig;
use tracing::{debug, trace};

/// Source of network facts, swappable in tests
pub trait NetworkProbe {
    /// Address of the outbound interface, if the host is online
    fn address(&self) -> Option<IpAddr>;

    /// Host name shown on the status page
    fn hostname(&self) -> String;

    /// Wireless hardware address without separators
    fn hardware_address(&self) -> String;

    /// Host part of the control endpoint URI
    fn endpoint(&self) -> Option<String>;

    /// Source address of the route toward `host`
    fn route_address(&self, host: &str) -> Option<IpAddr>;
}

/// Probes backed by the running host
#[derive(Debug, Clone)]
pub struct HostNetwork {
    probe_target: String,
    interface: String,
    endpoint_env: String,
}

impl HostNetwork {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            probe_target: config.probe_target.to_string(),
            interface: config.wireless_interface.to_string(),
            endpoint_env: config.endpoint_env.to_string(),
        }
    }
}

impl NetworkProbe for HostNetwork {
    fn address(&self) -> Option<IpAddr> {
        // Connecting a datagram socket sends nothing; it only picks a route
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        if let Err(err) = socket.connect(self.probe_target.as_str()) {
            trace!(%err, "no route to probe target");
            return None;
        }
        let address = socket.local_addr().ok()?.ip();
        (!address.is_unspecified()).then_some(address)
    }

    fn hostname(&self) -> String {
        fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|name| name.trim().to_string())
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".into())
    }

    fn hardware_address(&self) -> String {
        let path = format!("/sys/class/net/{}/address", self.interface);
        match fs::read_to_string(&path) {
            Ok(address) => address.trim().replace(':', ""),
            Err(err) => {
                debug!(%path, %err, "cannot read hardware address");
                "unknown".into()
            }
        }
    }

    fn endpoint(&self) -> Option<String> {
        std::env::var(&self.endpoint_env)
            .ok()
            .and_then(|uri| endpoint_host(&uri))
    }

    fn route_address(&self, host: &str) -> Option<IpAddr> {
        let output = Command::new("ip")
            .args(["-o", "route", "get", host])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_route_source(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Host part of `scheme://host:port`
pub fn endpoint_host(uri: &str) -> Option<String> {
    let host: String = uri.split(':').nth(1)?.chars().filter(|c| *c != '/').collect();
    (!host.is_empty()).then_some(host)
}

/// Address after `src` in one line of `ip -o route get` output
pub fn parse_route_source(output: &str) -> Option<IpAddr> {
    let mut tokens = output.split_whitespace();
    tokens.find(|token| *token == "src")?;
    tokens.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_route_source_direct() {
        let output = "192.168.1.5 dev wlan0 src 192.168.1.20 uid 1000 \\    cache";
        assert_eq!(
            parse_route_source(output),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)))
        );
    }

    #[test]
    fn test_route_source_via_gateway() {
        let output = "8.8.8.8 via 10.0.0.1 dev eth0 src 10.0.0.7 uid 0 \\    cache";
        assert_eq!(
            parse_route_source(output),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)))
        );
    }

    #[test]
    fn test_route_source_missing() {
        assert_eq!(parse_route_source("unreachable 8.8.8.8"), None);
        assert_eq!(parse_route_source("8.8.8.8 dev eth0 src"), None);
        assert_eq!(parse_route_source(""), None);
    }

    #[test]
    fn test_endpoint_host() {
        assert_eq!(
            endpoint_host("http://192.168.1.2:11311").as_deref(),
            Some("192.168.1.2")
        );
        assert_eq!(endpoint_host("http://robot.local:11311/").as_deref(), Some("robot.local"));
        assert_eq!(endpoint_host("localhost"), None);
        assert_eq!(endpoint_host(""), None);
    }
}
