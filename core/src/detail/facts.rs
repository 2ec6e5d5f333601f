use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use lanwatch_common::config::ScanConfig;
use lanwatch_common::models::Details;
use serde_json::Value;
use tracing::debug;

use super::{CONNECT_TIMEOUT_SECS, DetailError, DetailProbe, run_remote};
use crate::cancel::CancelToken;
use crate::process::{CommandRunner, CommandSpec};

pub const FACTS_BINARY: &str = "ansible";

/// Gathers `ansible_hostname` and `ansible_distribution` with the `setup` module.
pub struct FactsProbe {
    config: ScanConfig,
    runner: Arc<dyn CommandRunner>,
}

impl FactsProbe {
    pub fn new(config: ScanConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn command(&self, ip: IpAddr) -> CommandSpec {
        let creds = self.config.ssh_credentials_for(ip);
        CommandSpec::new(FACTS_BINARY)
            .arg("all")
            .arg("-i")
            .arg(format!("{ip},"))
            .args(["-m", "setup", "-a", "gather_subset=min"])
            .args(["-T".to_string(), CONNECT_TIMEOUT_SECS.to_string()])
            .args(["-u", creds.user.as_str(), "--private-key", creds.identity.as_str()])
            .env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .env("ANSIBLE_STDOUT_CALLBACK", "json")
            .env("ANSIBLE_LOAD_CALLBACK_PLUGINS", "1")
    }
}

#[async_trait]
impl DetailProbe for FactsProbe {
    async fn server_details(&self, cancel: &CancelToken, ip: IpAddr) -> Result<Details, DetailError> {
        let stdout = run_remote(self.runner.as_ref(), cancel, &self.command(ip)).await?;
        let details = parse_facts(&stdout, ip)?;
        debug!(ip = %ip, hostname = %details.hostname, os = %details.os, "facts gathered");
        Ok(details)
    }
}

/// Digs the host's facts out of the json stdout callback:
/// `plays[].tasks[].hosts[<ip>].ansible_facts`.
fn parse_facts(stdout: &str, ip: IpAddr) -> Result<Details, DetailError> {
    let report: Value = serde_json::from_str(stdout).map_err(|e| DetailError::Parse(e.to_string()))?;
    let key = ip.to_string();

    let host = report["plays"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|play| play["tasks"].as_array().into_iter().flatten())
        .find_map(|task| task["hosts"].get(&key))
        .ok_or_else(|| DetailError::Parse(format!("no facts reported for {key}")))?;

    if host["unreachable"].as_bool() == Some(true) || host["failed"].as_bool() == Some(true) {
        let msg = host["msg"].as_str().unwrap_or("host failed");
        return Err(DetailError::Parse(msg.trim().to_string()));
    }

    let facts = &host["ansible_facts"];
    let field = |name: &str| facts[name].as_str().unwrap_or_default().to_string();
    Ok(Details::new(field("ansible_hostname"), field("ansible_distribution")))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
