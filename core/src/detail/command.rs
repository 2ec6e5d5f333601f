use std::net::IpAddr;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use lanwatch_common::config::ScanConfig;
use lanwatch_common::models::Details;
use regex::Regex;
use tracing::debug;

use super::{CONNECT_TIMEOUT_SECS, DetailError, DetailProbe, run_remote};
use crate::cancel::CancelToken;
use crate::process::{CommandRunner, CommandSpec};

static PRETTY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^PRETTY_NAME="?([^"\n]*)"?\s*$"#).expect("PRETTY_NAME pattern is valid"));

/// Reads `uname -a` over plain SSH, and `/etc/os-release` for Linux hosts.
pub struct CommandProbe {
    config: ScanConfig,
    runner: Arc<dyn CommandRunner>,
}

impl CommandProbe {
    pub fn new(config: ScanConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn ssh(&self, ip: IpAddr, remote: &str) -> CommandSpec {
        let creds = self.config.ssh_credentials_for(ip);
        CommandSpec::new("ssh")
            .args(["-o", "StrictHostKeyChecking=no", "-o", "BatchMode=yes"])
            .args(["-o".to_string(), format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}")])
            .args(["-i", creds.identity.as_str()])
            .arg(format!("{}@{ip}", creds.user))
            .arg(remote)
    }
}

#[async_trait]
impl DetailProbe for CommandProbe {
    async fn server_details(&self, cancel: &CancelToken, ip: IpAddr) -> Result<Details, DetailError> {
        let uname = run_remote(self.runner.as_ref(), cancel, &self.ssh(ip, "uname -a")).await?;
        let (kernel, hostname) = parse_uname(&uname)?;

        let os = match kernel.as_str() {
            "Darwin" => "MacOS".to_string(),
            "Linux" => {
                let release = run_remote(self.runner.as_ref(), cancel, &self.ssh(ip, "cat /etc/os-release")).await?;
                pretty_name(&release).unwrap_or(kernel)
            }
            _ => kernel,
        };
        debug!(ip = %ip, hostname = %hostname, os = %os, "uname gathered");
        Ok(Details::new(hostname, os))
    }
}

/// First two whitespace-separated tokens: kernel name and node name.
fn parse_uname(output: &str) -> Result<(String, String), DetailError> {
    let mut tokens = output.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(kernel), Some(hostname)) => Ok((kernel.to_string(), hostname.to_string())),
        _ => Err(DetailError::Parse(format!("short uname output: {:?}", output.trim()))),
    }
}

fn pretty_name(os_release: &str) -> Option<String> {
    PRETTY_NAME
        .captures(os_release)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
