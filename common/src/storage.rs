//! Storage contracts consumed by the discovery engine.
//!
//! Implementations live outside the engine (SQL in production, in-memory for tests and the
//! bundled binary). Implementations are expected to serialize their own access.

use std::net::IpAddr;

use thiserror::Error;

use crate::config::ScanConfig;
use crate::models::Device;

#[derive(Debug, Error)]
pub enum RepoError {
    /// The looked-up record does not exist.
    #[error("record not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(String),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound)
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

pub trait DeviceRepo: Send + Sync {
    fn get_all(&self) -> RepoResult<Vec<Device>>;
    fn get_by_id(&self, id: &str) -> RepoResult<Device>;
    fn get_by_ip(&self, ip: IpAddr) -> RepoResult<Device>;
    fn add(&self, device: &Device) -> RepoResult<()>;
    fn update(&self, device: &Device) -> RepoResult<()>;
    fn delete(&self, id: &str) -> RepoResult<()>;
}

pub trait ConfigRepo: Send + Sync {
    fn get(&self, id: &str) -> RepoResult<ScanConfig>;
    fn get_all(&self) -> RepoResult<Vec<ScanConfig>>;
    fn create(&self, config: &ScanConfig) -> RepoResult<()>;
    fn update(&self, config: &ScanConfig) -> RepoResult<()>;
    fn delete(&self, id: &str) -> RepoResult<()>;
    /// The configuration flagged active, else the most recently written one.
    fn get_active_or_last_loaded(&self) -> RepoResult<ScanConfig>;
}
