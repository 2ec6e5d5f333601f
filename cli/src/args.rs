use std::time::Duration;

use clap::{Parser, ValueEnum};
use lanwatch_common::config::{DEFAULT_SCAN_INTERVAL, DetailKind, ProbeKind, ScanConfig, SshOverride};

#[derive(Parser, Debug)]
#[command(name = "lanwatch")]
#[command(about = "Keeps an inventory of the SSH servers on your network.")]
pub struct CommandLine {
    /// Address, CIDR block or range to watch (repeatable)
    #[arg(short, long = "target", required = true)]
    pub targets: Vec<String>,

    /// Network interface for the raw prober
    #[arg(short, long)]
    pub interface: Option<String>,

    #[arg(long, value_enum, default_value_t = Probe::Raw)]
    pub probe: Probe,

    #[arg(long, value_enum, default_value_t = DetailSource::Facts)]
    pub details: DetailSource,

    /// Default SSH user
    #[arg(short, long, default_value = "root")]
    pub user: String,

    /// Default SSH private key
    #[arg(long, default_value = "~/.ssh/id_rsa")]
    pub identity: String,

    /// Per-host credentials, `TARGET=USER[:IDENTITY]` (repeatable)
    #[arg(long = "override", value_parser = parse_override)]
    pub overrides: Vec<SshOverride>,

    /// Seconds between scans
    #[arg(long, default_value_t = DEFAULT_SCAN_INTERVAL.as_secs())]
    pub interval: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    Raw,
    Connect,
    External,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailSource {
    Facts,
    Command,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn into_config(self) -> ScanConfig {
        ScanConfig {
            id: String::from("cli"),
            name: String::from("command line"),
            targets: self.targets,
            interface: self.interface,
            ssh_user: self.user,
            ssh_identity: self.identity,
            ssh_overrides: self.overrides,
            probe: match self.probe {
                Probe::Raw => ProbeKind::RawArpSyn,
                Probe::Connect => ProbeKind::TcpConnect,
                Probe::External => ProbeKind::External,
            },
            detail: match self.details {
                DetailSource::Facts => DetailKind::Facts,
                DetailSource::Command => DetailKind::Command,
            },
            scan_interval: Duration::from_secs(self.interval.max(1)),
            active: true,
        }
    }
}

fn parse_override(raw: &str) -> Result<SshOverride, String> {
    let (target, credentials) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TARGET=USER[:IDENTITY], got '{raw}'"))?;
    if target.is_empty() {
        return Err(format!("missing target in '{raw}'"));
    }
    let (user, identity) = credentials.split_once(':').unwrap_or((credentials, ""));
    Ok(SshOverride {
        target: target.to_string(),
        user: user.to_string(),
        identity: identity.to_string(),
    })
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

    #[test]
    fn override_with_user_only() {
        let rule = parse_override("10.0.0.9=bob").unwrap();
        assert_eq!(rule.target, "10.0.0.9");
        assert_eq!(rule.user, "bob");
        assert!(rule.identity.is_empty());
    }

    #[test]
    fn override_with_identity() {
        let rule = parse_override("10.0.0.9=bob:/keys/bob").unwrap();
        assert_eq!(rule.user, "bob");
        assert_eq!(rule.identity, "/keys/bob");
    }

    #[test]
    fn override_without_separator_is_rejected() {
        assert!(parse_override("10.0.0.9").is_err());
        assert!(parse_override("=bob").is_err());
    }

    #[test]
    fn flags_map_onto_scan_config() {
        let cli = CommandLine::parse_from([
            "lanwatch",
            "-t",
            "10.0.0.0/24",
            "--target",
            "10.0.1.5",
            "--probe",
            "connect",
            "--details",
            "command",
            "--override",
            "10.0.1.5=pi",
            "--interval",
            "60",
        ]);
        let config = cli.into_config();

        assert_eq!(config.targets, vec!["10.0.0.0/24", "10.0.1.5"]);
        assert_eq!(config.probe, ProbeKind::TcpConnect);
        assert_eq!(config.detail, DetailKind::Command);
        assert_eq!(config.ssh_user, "root");
        assert_eq!(config.ssh_overrides[0].user, "pi");
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert!(config.active);
    }
}
