//! The discovery-and-monitoring engine.
//!
//! [`controller::Controller`] owns the active configuration and rebuilds a
//! [`probe::NetworkProbe`] / [`detail::DetailProbe`] pair into an
//! [`orchestrator::Orchestrator`], which polls the network and feeds the
//! [`registry::DeviceRegistry`]. State changes fan out through [`event::EventBus`].

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cancel;
pub mod capture;
pub mod controller;
pub mod detail;
pub mod event;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod registry;
pub mod storage;

/// Locks a std mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
