//! The network-probe **abstraction**.
//!
//! A [`NetworkProbe`] decides which configured targets are reachable and whether their SSH
//! port answers. Three strategies implement it:
//!
//! * [`raw::RawProbe`]: ARP sweep, then a crafted SYN to port 22 for every host that answers.
//! * [`connect::ConnectProbe`]: an OS-level TCP connect to port 22 with a short timeout.
//! * [`external::ExternalProbe`]: delegates discovery to `nmap` and parses its XML report.
//!
//! Callers pick one through configuration and only ever hold the trait object.

use async_trait::async_trait;
use lanwatch_common::models::DiscoveryResult;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod connect;
pub mod external;
pub mod raw;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture failure: {0}")]
    Capture(String),
    #[error("raw probing requires root privileges")]
    Privilege,
    #[error("external scanner failed: {0}")]
    Scanner(String),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("probe has been stopped")]
    Stopped,
    #[error("scan loop aborted: {0}")]
    Aborted(String),
}

#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Starts one scan cycle. Results are pushed into `results` as they are observed,
    /// possibly after this call has returned.
    async fn scan(&self, results: mpsc::Sender<DiscoveryResult>) -> Result<(), ProbeError>;

    /// Releases every OS resource held by the probe. Idempotent; a stopped probe
    /// answers every later scan with [`ProbeError::Stopped`].
    fn stop(&self);
}
