use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use lanwatch_common::models::{DiscoveryResult, Port, PortStatus, SSH_PORT, Status};
use pnet::util::MacAddr;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{NetworkProbe, ProbeError};
use crate::cancel::CancelSource;
use crate::process::{CommandRunner, CommandSpec};

pub const SCANNER_BINARY: &str = "nmap";

pub struct ExternalProbe {
    binary: String,
    targets: Vec<String>,
    runner: Arc<dyn CommandRunner>,
    cancel: CancelSource,
}

impl ExternalProbe {
    pub fn new(targets: Vec<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: SCANNER_BINARY.to_string(),
            targets,
            runner,
            cancel: CancelSource::new(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// TCP ACK host discovery on port 22, fastest timing, verbose XML report on stdout.
    fn command(&self) -> CommandSpec {
        let port = SSH_PORT.to_string();
        CommandSpec::new(&self.binary)
            .arg(format!("-PA{port}"))
            .args(["-p", port.as_str(), "-T5", "-v", "-oX", "-"])
            .args(self.targets.iter().cloned())
    }
}

#[async_trait]
impl NetworkProbe for ExternalProbe {
    async fn scan(&self, results: mpsc::Sender<DiscoveryResult>) -> Result<(), ProbeError> {
        if self.cancel.is_cancelled() {
            return Err(ProbeError::Stopped);
        }
        let spec = self.command();
        let token = self.cancel.token();

        let output = tokio::select! {
            output = self.runner.run(&spec) => output?,
            _ = token.cancelled() => return Err(ProbeError::Stopped),
        };

        if !output.success {
            let reason = match output.stderr.trim() {
                "" => format!("{} exited with {:?}", spec.program, output.code),
                stderr => stderr.to_string(),
            };
            return Err(ProbeError::Scanner(reason));
        }
        for line in output.stderr.lines().filter(|line| !line.trim().is_empty()) {
            warn!(scanner = %spec.program, "{line}");
        }

        let hosts = parse_report(&output.stdout)?;
        debug!(hosts = hosts.len(), "scanner report parsed");
        for result in hosts {
            if results.send(result).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Default)]
struct HostEntry {
    state: Option<String>,
    addr: Option<String>,
    mac: Option<String>,
    hostname: Option<String>,
    ports: Vec<Port>,
}

impl HostEntry {
    fn into_result(self) -> Option<DiscoveryResult> {
        let ip = IpAddr::from_str(self.addr.as_deref()?).ok()?;
        let status = match self.state.as_deref() {
            Some("up") => Status::Online,
            Some("down") => Status::Offline,
            _ => Status::Unknown,
        };
        let mut result = match self.mac.as_deref().and_then(|mac| MacAddr::from_str(mac).ok()) {
            Some(mac) => DiscoveryResult::from_mac(ip, mac, status),
            None => DiscoveryResult::new(ip, status),
        };
        result.hostname = self.hostname.unwrap_or_default();
        result.ports = self.ports;
        Some(result)
    }
}

fn attr(element: &BytesStart, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attribute| attribute.key.as_ref() == name)
        .map(|attribute| String::from_utf8_lossy(&attribute.value).into_owned())
}

/// Parses an nmap XML report into one result per `<host>` element.
pub(crate) fn parse_report(xml: &str) -> Result<Vec<DiscoveryResult>, ProbeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut results = Vec::new();
    let mut host: Option<HostEntry> = None;
    let mut port: Option<u16> = None;

    loop {
        let event = reader.read_event().map_err(|e| ProbeError::Parse(e.to_string()))?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"host" => host = Some(HostEntry::default()),
            Event::Start(e) if e.name().as_ref() == b"port" => {
                port = attr(&e, b"portid").and_then(|id| id.parse().ok());
            }
            Event::Start(e) | Event::Empty(e) => {
                let Some(entry) = host.as_mut() else { continue };
                match e.name().as_ref() {
                    b"status" => entry.state = attr(&e, b"state"),
                    b"address" => match attr(&e, b"addrtype").as_deref() {
                        Some("mac") => entry.mac = attr(&e, b"addr"),
                        Some(_) if entry.addr.is_none() => entry.addr = attr(&e, b"addr"),
                        _ => {}
                    },
                    b"hostname" if entry.hostname.is_none() => entry.hostname = attr(&e, b"name"),
                    b"state" => {
                        if let Some(id) = port {
                            let status = match attr(&e, b"state").as_deref() {
                                Some("open") => PortStatus::Open,
                                _ => PortStatus::Closed,
                            };
                            entry.ports.push(Port::new(id, status));
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"host" => {
                    if let Some(entry) = host.take() {
                        match entry.into_result() {
                            Some(result) => results.push(result),
                            None => warn!("scanner reported a host without a usable address"),
                        }
                    }
                }
                b"port" => port = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(results)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
