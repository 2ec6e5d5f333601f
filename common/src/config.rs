//! Scan configuration and SSH credential resolution.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::target::{self, Target};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration '{0}' does not exist")]
    NotFound(String),
    #[error("no active or previously loaded configuration")]
    NoActive,
    #[error("invalid scan target: {0}")]
    InvalidTarget(String),
    #[error("configuration '{0}' has a zero scan interval")]
    InvalidInterval(String),
}

/// Which network prober a configuration drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Raw ARP sweep followed by a crafted TCP SYN to port 22.
    #[default]
    RawArpSyn,
    /// OS-level TCP connect to port 22.
    TcpConnect,
    /// Delegates discovery to an external scanner binary.
    External,
}

/// Which remote fact gatherer a configuration drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    /// Structured facts collected by a single ad-hoc fact-gathering run.
    #[default]
    Facts,
    /// `uname -a` and `/etc/os-release` read over plain SSH.
    Command,
}

/// Per-target replacement of the default SSH user and identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshOverride {
    pub target: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub identity: String,
}

/// The effective credentials for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCredentials {
    pub user: String,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub id: String,
    pub name: String,
    /// Single addresses, CIDR blocks or IPv4 ranges.
    pub targets: Vec<String>,
    /// Interface the raw prober binds to; `None` picks the best LAN interface.
    #[serde(default)]
    pub interface: Option<String>,
    pub ssh_user: String,
    pub ssh_identity: String,
    #[serde(default)]
    pub ssh_overrides: Vec<SshOverride>,
    #[serde(default)]
    pub probe: ProbeKind,
    #[serde(default)]
    pub detail: DetailKind,
    #[serde(default = "default_scan_interval", with = "seconds")]
    pub scan_interval: Duration,
    #[serde(default)]
    pub active: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            id: String::from("default"),
            name: String::from("default"),
            targets: Vec::new(),
            interface: None,
            ssh_user: String::from("root"),
            ssh_identity: String::from("~/.ssh/id_rsa"),
            ssh_overrides: Vec::new(),
            probe: ProbeKind::default(),
            detail: DetailKind::default(),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            active: false,
        }
    }
}

impl ScanConfig {
    /// Resolves the SSH user and identity for `ip`.
    ///
    /// The first override whose target equals the textual address wins; its blank
    /// fields keep the configuration default.
    pub fn ssh_credentials_for(&self, ip: IpAddr) -> SshCredentials {
        let ip = ip.to_string();
        let mut credentials = SshCredentials {
            user: self.ssh_user.clone(),
            identity: self.ssh_identity.clone(),
        };

        if let Some(rule) = self.ssh_overrides.iter().find(|rule| rule.target == ip) {
            if !rule.user.is_empty() {
                credentials.user = rule.user.clone();
            }
            if !rule.identity.is_empty() {
                credentials.identity = rule.identity.clone();
            }
        }

        credentials
    }

    /// Rejects settings no prober can run with. Targets are checked by the probers themselves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(self.id.clone()));
        }
        Ok(())
    }

    pub fn parsed_targets(&self) -> Result<Vec<Target>, ConfigError> {
        self.targets
            .iter()
            .map(|raw| Target::from_str(raw).map_err(ConfigError::InvalidTarget))
            .collect()
    }

    /// Every configured target expanded into a deduplicated host list.
    pub fn expand_targets(&self) -> Result<Vec<IpAddr>, ConfigError> {
        Ok(target::expand(&self.parsed_targets()?))
    }
}

fn default_scan_interval() -> Duration {
    DEFAULT_SCAN_INTERVAL
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
