//! Selection of the network interface the raw prober binds to.

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};
use thiserror::Error;
use tracing::{debug, trace};

#[cfg(target_os = "linux")]
use linux_impl::{is_physical, is_wireless};
#[cfg(not(target_os = "linux"))]
use fallback_impl::{is_physical, is_wireless};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Error)]
pub enum ViabilityError {
    #[error("interface is down")]
    IsDown,
    #[error("interface is not a physical device")]
    NotPhysical,
    #[error("interface has no MAC address")]
    NoMacAddress,
    #[error("interface does not support broadcast")]
    NotBroadcast,
    #[error("interface is a point-to-point link")]
    IsPointToPoint,
    #[error("interface has no private IPv4 address")]
    NoValidLanIp,
}

#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("network interface '{0}' does not exist")]
    NotFound(String),
    #[error("network interface '{name}' cannot be used for ARP: {reason}")]
    NotViable { name: String, reason: ViabilityError },
    #[error("no interfaces available for LAN discovery")]
    NoneAvailable,
}

pub trait NetworkInterfaceExtension {
    fn get_ipv4_nets(&self) -> Vec<Ipv4Network>;
    /// First non-loopback IPv4 network bound to the interface.
    fn get_ipv4_net(&self) -> Option<Ipv4Network>;
}

impl NetworkInterfaceExtension for NetworkInterface {
    fn get_ipv4_nets(&self) -> Vec<Ipv4Network> {
        self.ips
            .iter()
            .filter_map(|ip| match ip {
                IpNetwork::V4(ipv4) => Some(*ipv4),
                IpNetwork::V6(_) => None,
            })
            .collect()
    }

    fn get_ipv4_net(&self) -> Option<Ipv4Network> {
        self.get_ipv4_nets()
            .into_iter()
            .find(|net| !net.ip().is_loopback())
    }
}

/// Resolves the interface to bind to.
///
/// A configured name must exist and be usable for ARP; without one the best LAN
/// interface is picked, wired before wireless.
pub fn select_interface(name: Option<&str>) -> Result<NetworkInterface, InterfaceError> {
    select_from(datalink::interfaces(), name, is_physical, is_wired)
}

fn select_from(
    interfaces: Vec<NetworkInterface>,
    name: Option<&str>,
    is_physical: impl Fn(&NetworkInterface) -> bool,
    is_wired: impl Fn(&NetworkInterface) -> bool,
) -> Result<NetworkInterface, InterfaceError> {
    if let Some(name) = name {
        let interface = interfaces
            .into_iter()
            .find(|interface| interface.name == name)
            .ok_or_else(|| InterfaceError::NotFound(name.to_string()))?;
        // An explicit choice skips the physical-device heuristic.
        is_viable_lan_interface(&interface, |_| true).map_err(|reason| {
            InterfaceError::NotViable {
                name: interface.name.clone(),
                reason,
            }
        })?;
        return Ok(interface);
    }

    let candidates: Vec<NetworkInterface> = interfaces
        .into_iter()
        .filter(|interface| match is_viable_lan_interface(interface, &is_physical) {
            Ok(()) => true,
            Err(reason) => {
                trace!(interface = %interface.name, %reason, "interface skipped");
                false
            }
        })
        .collect();

    let selected = select_best_lan_interface(candidates, is_wired).ok_or(InterfaceError::NoneAvailable)?;
    debug!(interface = %selected.name, "interface selected");
    Ok(selected)
}

fn is_viable_lan_interface(
    interface: &NetworkInterface,
    is_physical: impl Fn(&NetworkInterface) -> bool,
) -> Result<(), ViabilityError> {
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.is_loopback() || !is_physical(interface) {
        return Err(ViabilityError::NotPhysical);
    }
    if interface.mac.is_none() {
        return Err(ViabilityError::NoMacAddress);
    }
    if !interface.is_broadcast() {
        return Err(ViabilityError::NotBroadcast);
    }
    if interface.is_point_to_point() {
        return Err(ViabilityError::IsPointToPoint);
    }
    let has_private_v4 = interface
        .get_ipv4_nets()
        .iter()
        .any(|net| net.ip().is_private());
    if !has_private_v4 {
        return Err(ViabilityError::NoValidLanIp);
    }
    Ok(())
}

fn select_best_lan_interface(
    interfaces: Vec<NetworkInterface>,
    is_wired: impl Fn(&NetworkInterface) -> bool,
) -> Option<NetworkInterface> {
    let wired = interfaces.iter().position(|interface| is_wired(interface));
    let index = wired.unwrap_or(0);
    interfaces.into_iter().nth(index)
}

fn is_wired(interface: &NetworkInterface) -> bool {
    is_physical(interface) && !is_wireless(interface)
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::path::Path;

    pub fn is_physical(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/device", interface.name)).exists()
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/wireless", interface.name)).exists()
    }
}

#[cfg(not(target_os = "linux"))]
mod fallback_impl {
    use super::*;

    pub fn is_physical(interface: &NetworkInterface) -> bool {
        !interface.is_loopback()
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        interface.name.starts_with("wl")
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
