//! Hostname and OS enrichment over SSH.
//!
//! * [`facts::FactsProbe`]: one ad-hoc fact-gathering run, JSON on stdout.
//! * [`command::CommandProbe`]: `uname -a`, then `/etc/os-release` on Linux.
//!
//! Failures are returned to the caller, which treats them as "no details available".

use std::net::IpAddr;

use async_trait::async_trait;
use lanwatch_common::models::Details;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::process::{CommandRunner, CommandSpec};

pub mod command;
pub mod facts;

/// Seconds a remote fact gatherer may spend establishing its SSH connection.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum DetailError {
    #[error("failed to launch {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unexpected output: {0}")]
    Parse(String),
    #[error("detail gathering cancelled")]
    Cancelled,
}

#[async_trait]
pub trait DetailProbe: Send + Sync {
    async fn server_details(&self, cancel: &CancelToken, ip: IpAddr) -> Result<Details, DetailError>;
}

/// Runs `spec` to completion unless `cancel` fires first; returns stdout of a successful run.
pub(crate) async fn run_remote(
    runner: &dyn CommandRunner,
    cancel: &CancelToken,
    spec: &CommandSpec,
) -> Result<String, DetailError> {
    if cancel.is_cancelled() {
        return Err(DetailError::Cancelled);
    }
    let output = tokio::select! {
        output = runner.run(spec) => output.map_err(|source| DetailError::Command {
            program: spec.program.clone(),
            source,
        })?,
        _ = cancel.cancelled() => return Err(DetailError::Cancelled),
    };
    if !output.success {
        return Err(DetailError::Exit {
            program: spec.program.clone(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
