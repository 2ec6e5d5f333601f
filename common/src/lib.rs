//! Shared model for the `lanwatch` discovery engine.
//!
//! * [`models`]: discovery results, devices and their status enums.
//! * [`config`]: scan configuration and SSH credential overrides.
//! * [`storage`]: repository contracts implemented outside the engine.
//! * [`network`]: scan targets, CIDR expansion and interface selection.

pub mod config;
pub mod models;
pub mod network;
pub mod storage;
