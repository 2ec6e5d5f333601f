//! In-memory storage adapters, used by the binary and by tests in place of SQL.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use lanwatch_common::config::ScanConfig;
use lanwatch_common::models::Device;
use lanwatch_common::storage::{ConfigRepo, DeviceRepo, RepoError, RepoResult};

use crate::lock;

#[derive(Debug, Default)]
pub struct MemoryDeviceRepo {
    devices: Mutex<Vec<Device>>,
}

impl MemoryDeviceRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRepo for MemoryDeviceRepo {
    fn get_all(&self) -> RepoResult<Vec<Device>> {
        Ok(lock(&self.devices).clone())
    }

    fn get_by_id(&self, id: &str) -> RepoResult<Device> {
        lock(&self.devices)
            .iter()
            .find(|device| device.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    fn get_by_ip(&self, ip: IpAddr) -> RepoResult<Device> {
        lock(&self.devices)
            .iter()
            .find(|device| device.ip == ip)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    fn add(&self, device: &Device) -> RepoResult<()> {
        let mut devices = lock(&self.devices);
        if devices.iter().any(|existing| existing.id == device.id) {
            return Err(RepoError::Storage(format!("device '{}' already exists", device.id)));
        }
        devices.push(device.clone());
        Ok(())
    }

    fn update(&self, device: &Device) -> RepoResult<()> {
        let mut devices = lock(&self.devices);
        let slot = devices
            .iter_mut()
            .find(|existing| existing.id == device.id)
            .ok_or(RepoError::NotFound)?;
        *slot = device.clone();
        Ok(())
    }

    fn delete(&self, id: &str) -> RepoResult<()> {
        let mut devices = lock(&self.devices);
        let before = devices.len();
        devices.retain(|device| device.id != id);
        if devices.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ConfigSlots {
    configs: HashMap<String, (u64, ScanConfig)>,
    writes: u64,
}

#[derive(Debug, Default)]
pub struct MemoryConfigRepo {
    inner: Mutex<ConfigSlots>,
}

impl MemoryConfigRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScanConfig) -> Self {
        let repo = Self::new();
        {
            let mut inner = lock(&repo.inner);
            inner.writes += 1;
            let seq = inner.writes;
            inner.configs.insert(config.id.clone(), (seq, config));
        }
        repo
    }
}

impl ConfigRepo for MemoryConfigRepo {
    fn get(&self, id: &str) -> RepoResult<ScanConfig> {
        lock(&self.inner)
            .configs
            .get(id)
            .map(|(_, config)| config.clone())
            .ok_or(RepoError::NotFound)
    }

    fn get_all(&self) -> RepoResult<Vec<ScanConfig>> {
        let inner = lock(&self.inner);
        let mut configs: Vec<&(u64, ScanConfig)> = inner.configs.values().collect();
        configs.sort_by_key(|(seq, _)| *seq);
        Ok(configs.into_iter().map(|(_, config)| config.clone()).collect())
    }

    fn create(&self, config: &ScanConfig) -> RepoResult<()> {
        let mut inner = lock(&self.inner);
        if inner.configs.contains_key(&config.id) {
            return Err(RepoError::Storage(format!("config '{}' already exists", config.id)));
        }
        inner.writes += 1;
        let seq = inner.writes;
        inner.configs.insert(config.id.clone(), (seq, config.clone()));
        Ok(())
    }

    fn update(&self, config: &ScanConfig) -> RepoResult<()> {
        let mut inner = lock(&self.inner);
        inner.writes += 1;
        let seq = inner.writes;
        let slot = inner.configs.get_mut(&config.id).ok_or(RepoError::NotFound)?;
        *slot = (seq, config.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> RepoResult<()> {
        lock(&self.inner)
            .configs
            .remove(id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    fn get_active_or_last_loaded(&self) -> RepoResult<ScanConfig> {
        let inner = lock(&self.inner);
        let active = inner
            .configs
            .values()
            .filter(|(_, config)| config.active)
            .max_by_key(|(seq, _)| *seq);
        active
            .or_else(|| inner.configs.values().max_by_key(|(seq, _)| *seq))
            .map(|(_, config)| config.clone())
            .ok_or(RepoError::NotFound)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config(id: &str, active: bool) -> ScanConfig {
        ScanConfig {
            id: id.into(),
            name: id.into(),
            active,
            ..Default::default()
        }
    }

    #[test]
    fn device_lookups_return_not_found_sentinel() {
        let repo = MemoryDeviceRepo::new();
        assert!(repo.get_by_id("x").unwrap_err().is_not_found());
        assert!(repo.get_by_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap_err().is_not_found());
        assert!(repo.update(&Device::new("x", IpAddr::V4(Ipv4Addr::LOCALHOST))).unwrap_err().is_not_found());
        assert!(repo.delete("x").unwrap_err().is_not_found());
    }

    #[test]
    fn device_add_rejects_duplicate_ids() {
        let repo = MemoryDeviceRepo::new();
        let device = Device::new("x", IpAddr::V4(Ipv4Addr::LOCALHOST));
        repo.add(&device).unwrap();
        assert!(matches!(repo.add(&device), Err(RepoError::Storage(_))));
        repo.delete("x").unwrap();
        assert!(repo.get_all().unwrap().is_empty());
    }

    #[test]
    fn active_config_wins_over_recent_writes() {
        let repo = MemoryConfigRepo::new();
        repo.create(&config("home", true)).unwrap();
        repo.create(&config("lab", false)).unwrap();
        assert_eq!(repo.get_active_or_last_loaded().unwrap().id, "home");
    }

    #[test]
    fn without_active_config_the_last_written_is_used() {
        let repo = MemoryConfigRepo::new();
        repo.create(&config("home", false)).unwrap();
        repo.create(&config("lab", false)).unwrap();
        assert_eq!(repo.get_active_or_last_loaded().unwrap().id, "lab");

        repo.update(&config("home", false)).unwrap();
        assert_eq!(repo.get_active_or_last_loaded().unwrap().id, "home");
    }

    #[test]
    fn empty_config_repo_reports_not_found() {
        let repo = MemoryConfigRepo::new();
        assert!(repo.get_active_or_last_loaded().unwrap_err().is_not_found());
        assert!(repo.update(&config("ghost", false)).unwrap_err().is_not_found());
    }

    #[test]
    fn get_all_is_in_write_order() {
        let repo = MemoryConfigRepo::with_config(config("a", false));
        repo.create(&config("b", false)).unwrap();
        let ids: Vec<String> = repo.get_all().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
