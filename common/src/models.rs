//! # Discovery Data Model
//!
//! Values that flow between the probes, the orchestrator and the device registry.
//!
//! * [`DiscoveryResult`]: one transient observation of a host, produced per scan cycle.
//! * [`Details`]: hostname and OS facts gathered from a reachable host.
//! * [`Device`]: the persisted record tracked by the registry.

use std::fmt;
use std::net::IpAddr;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Port probed for SSH exposure.
pub const SSH_PORT: u16 = 22;

/// Placeholder stored for hostname/OS facts that could not be gathered.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub id: u16,
    pub status: PortStatus,
}

impl Port {
    pub fn new(id: u16, status: PortStatus) -> Self {
        Self { id, status }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SshStatus {
    Enabled,
    #[default]
    Disabled,
}

impl SshStatus {
    /// Derives the SSH status strictly from the port-22 entry of a port list.
    ///
    /// Open maps to enabled; closed or absent maps to disabled.
    pub fn from_ports(ports: &[Port]) -> Self {
        match ports.iter().find(|port| port.id == SSH_PORT) {
            Some(Port { status: PortStatus::Open, .. }) => SshStatus::Enabled,
            _ => SshStatus::Disabled,
        }
    }
}

/// How a discovered host is classified before it is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// Port 22 was probed for this host, open or not.
    Server,
    /// Nothing is known about the host besides its reachability.
    Unknown,
}

impl DeviceType {
    pub fn from_ports(ports: &[Port]) -> Self {
        if ports.iter().any(|port| port.id == SSH_PORT) {
            DeviceType::Server
        } else {
            DeviceType::Unknown
        }
    }
}

/// A single probe observation of a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Deterministic across scans: the MAC address when known, an IP content hash otherwise.
    pub id: String,
    pub ip: IpAddr,
    pub hostname: String,
    pub os: String,
    pub status: Status,
    pub ports: Vec<Port>,
}

impl DiscoveryResult {
    /// Result keyed by the content hash of `ip`.
    pub fn new(ip: IpAddr, status: Status) -> Self {
        Self {
            id: id_from_ip(ip),
            ip,
            hostname: String::new(),
            os: String::new(),
            status,
            ports: Vec::new(),
        }
    }

    /// Result keyed by the hardware address of the host.
    pub fn from_mac(ip: IpAddr, mac: MacAddr, status: Status) -> Self {
        Self {
            id: id_from_mac(mac),
            ..Self::new(ip, status)
        }
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    pub fn device_type(&self) -> DeviceType {
        DeviceType::from_ports(&self.ports)
    }

    pub fn ssh_status(&self) -> SshStatus {
        SshStatus::from_ports(&self.ports)
    }
}

/// Hostname and OS facts gathered over SSH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    pub hostname: String,
    pub os: String,
}

impl Details {
    pub fn new(hostname: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            os: os.into(),
        }
    }

    /// Both fields blank: nothing was learned about the host.
    pub fn is_empty(&self) -> bool {
        self.hostname.trim().is_empty() && self.os.trim().is_empty()
    }

    /// Replaces blank fields with [`UNKNOWN`].
    pub fn or_unknown(self) -> Self {
        Self {
            hostname: non_blank_or_unknown(self.hostname),
            os: non_blank_or_unknown(self.os),
        }
    }
}

/// A tracked network device as persisted by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub hostname: String,
    pub ip: IpAddr,
    pub os: String,
    pub status: Status,
    pub ssh_status: SshStatus,
}

impl Device {
    pub fn new(id: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            id: id.into(),
            hostname: UNKNOWN.to_string(),
            ip,
            os: UNKNOWN.to_string(),
            status: Status::Unknown,
            ssh_status: SshStatus::Disabled,
        }
    }

    pub fn with_details(mut self, details: Details) -> Self {
        let details = details.or_unknown();
        self.hostname = details.hostname;
        self.os = details.os;
        self
    }

    pub fn with_status(mut self, status: Status, ssh_status: SshStatus) -> Self {
        self.status = status;
        self.ssh_status = ssh_status;
        self
    }

    /// Facts recorded for this device, `None` when neither field holds a real value.
    pub fn known_details(&self) -> Option<Details> {
        let hostname = known(&self.hostname);
        let os = known(&self.os);
        if hostname.is_empty() && os.is_empty() {
            return None;
        }
        Some(Details::new(hostname, os))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} os={} status={:?} ssh={:?}",
            self.hostname, self.id, self.ip, self.os, self.status, self.ssh_status
        )
    }
}

/// Stable identifier derived from a hardware address.
pub fn id_from_mac(mac: MacAddr) -> String {
    mac.to_string()
}

/// Stable identifier derived from the SHA-256 digest of the textual IP address.
pub fn id_from_ip(ip: IpAddr) -> String {
    let digest = Sha256::digest(ip.to_string().as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn non_blank_or_unknown(value: String) -> String {
    if value.trim().is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}

fn known(value: &str) -> &str {
    if value == UNKNOWN { "" } else { value.trim() }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn ssh_status_follows_port_22_only() {
        let open = [Port::new(22, PortStatus::Open)];
        let closed = [Port::new(22, PortStatus::Closed)];
        let other = [Port::new(80, PortStatus::Open)];

        assert_eq!(SshStatus::from_ports(&open), SshStatus::Enabled);
        assert_eq!(SshStatus::from_ports(&closed), SshStatus::Disabled);
        assert_eq!(SshStatus::from_ports(&other), SshStatus::Disabled);
        assert_eq!(SshStatus::from_ports(&[]), SshStatus::Disabled);
    }

    #[test]
    fn device_type_is_server_when_port_22_was_probed() {
        assert_eq!(
            DeviceType::from_ports(&[Port::new(22, PortStatus::Closed)]),
            DeviceType::Server
        );
        assert_eq!(
            DeviceType::from_ports(&[Port::new(443, PortStatus::Open)]),
            DeviceType::Unknown
        );
    }

    #[test]
    fn ip_id_is_deterministic_and_distinct() {
        assert_eq!(id_from_ip(ip(7)), id_from_ip(ip(7)));
        assert_ne!(id_from_ip(ip(7)), id_from_ip(ip(8)));
        assert_eq!(id_from_ip(ip(7)).len(), 64);
    }

    #[test]
    fn mac_id_uses_colon_notation() {
        let mac = MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
        let result = DiscoveryResult::from_mac(ip(7), mac, Status::Online);
        assert_eq!(result.id, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn blank_details_become_unknown() {
        let details = Details::new("  ", "Debian").or_unknown();
        assert_eq!(details.hostname, UNKNOWN);
        assert_eq!(details.os, "Debian");
        assert!(Details::default().is_empty());
    }

    #[test]
    fn known_details_ignores_placeholders() {
        let device = Device::new("id", ip(1));
        assert!(device.known_details().is_none());

        let device = device.with_details(Details::new("nas", ""));
        assert_eq!(device.known_details(), Some(Details::new("nas", "")));
    }
}
