//! Device registry: storage upserts plus a `ServerUpdate` stream for every change.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use lanwatch_common::models::{Device, SshStatus, Status};
use lanwatch_common::storage::{DeviceRepo, RepoError, RepoResult};
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::{Event, Fanout};
use crate::lock;

pub struct DeviceRegistry {
    repo: Arc<dyn DeviceRepo>,
    streams: Fanout<()>,
    /// Held across lookup, write and publish so concurrent upserts of one id serialize.
    writes: Mutex<()>,
}

impl DeviceRegistry {
    pub fn new(repo: Arc<dyn DeviceRepo>) -> Self {
        Self {
            repo,
            streams: Fanout::new(),
            writes: Mutex::new(()),
        }
    }

    /// Inserts the device when its id is unknown, updates it otherwise, then publishes it.
    pub fn add_or_update_server(&self, device: Device) -> RepoResult<Device> {
        let _writes = lock(&self.writes);
        match self.repo.get_by_id(&device.id) {
            Ok(_) => self.repo.update(&device)?,
            Err(RepoError::NotFound) => self.repo.add(&device)?,
            Err(e) => return Err(e),
        }
        debug!(id = %device.id, ip = %device.ip, status = ?device.status, "device stored");
        self.publish(&device);
        Ok(device)
    }

    /// Marks the device at `ip` offline with SSH disabled and republishes it.
    ///
    /// An untracked `ip` is not an error: nothing is written and `None` comes back.
    pub fn mark_offline(&self, ip: IpAddr) -> RepoResult<Option<Device>> {
        let _writes = lock(&self.writes);
        let device = match self.repo.get_by_ip(ip) {
            Ok(device) => device,
            Err(RepoError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let device = device.with_status(Status::Offline, SshStatus::Disabled);
        self.repo.update(&device)?;
        debug!(id = %device.id, ip = %ip, "device marked offline");
        self.publish(&device);
        Ok(Some(device))
    }

    pub fn get(&self, id: &str) -> RepoResult<Option<Device>> {
        match self.repo.get_by_id(id) {
            Ok(device) => Ok(Some(device)),
            Err(RepoError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn all(&self) -> RepoResult<Vec<Device>> {
        self.repo.get_all()
    }

    pub fn stream_events(&self, tx: mpsc::Sender<Event>) -> u64 {
        self.streams.register((), tx)
    }

    /// Closes and forgets the stream; unknown ids are ignored.
    pub fn stop_stream(&self, id: u64) -> u64 {
        self.streams.remove(id)
    }

    pub fn dropped(&self, id: u64) -> Option<u64> {
        self.streams.dropped(id)
    }

    fn publish(&self, device: &Device) {
        self.streams.publish(&(), &Event::ServerUpdate(device.clone()));
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
