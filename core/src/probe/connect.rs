use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lanwatch_common::models::{DiscoveryResult, Port, PortStatus, SSH_PORT, Status};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::{NetworkProbe, ProbeError};

pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
/// Connections in flight at once; keeps large target lists from exhausting descriptors.
pub const MAX_IN_FLIGHT: usize = 1000;

pub struct ConnectProbe {
    targets: Vec<IpAddr>,
    port: u16,
    connect_timeout: Duration,
    permits: Arc<Semaphore>,
    stopped: AtomicBool,
}

impl ConnectProbe {
    pub fn new(targets: Vec<IpAddr>) -> Self {
        Self {
            targets,
            port: SSH_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl NetworkProbe for ConnectProbe {
    async fn scan(&self, results: mpsc::Sender<DiscoveryResult>) -> Result<(), ProbeError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ProbeError::Stopped);
        }
        debug!(targets = self.targets.len(), port = self.port, "connect sweep");

        for &ip in &self.targets {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                // closed by stop()
                Err(_) => return Err(ProbeError::Stopped),
            };
            let results = results.clone();
            let (port, connect_timeout) = (self.port, self.connect_timeout);

            tokio::spawn(async move {
                let result = probe(ip, port, connect_timeout).await;
                drop(permit);
                trace!(ip = %ip, status = ?result.status, "connect probe finished");
                let _ = results.send(result).await;
            });
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.permits.close();
    }
}

async fn probe(ip: IpAddr, port: u16, connect_timeout: Duration) -> DiscoveryResult {
    let attempt = timeout(connect_timeout, TcpStream::connect(SocketAddr::new(ip, port)))
        .await
        .ok()
        .map(|connected| connected.map(|_stream| ()));
    classify(ip, port, attempt)
}

/// `None` means the attempt timed out.
fn classify(ip: IpAddr, port: u16, attempt: Option<io::Result<()>>) -> DiscoveryResult {
    let (status, port_status) = match attempt {
        Some(Ok(())) => (Status::Online, PortStatus::Open),
        Some(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => (Status::Online, PortStatus::Closed),
        _ => (Status::Offline, PortStatus::Closed),
    };
    DiscoveryResult::new(ip, status).with_port(Port::new(port, port_status))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
