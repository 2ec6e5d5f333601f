//! # Scan Target Model
//!
//! Parses configured target strings and expands them into concrete host lists.
//!
//! Accepted forms:
//! * A single IPv4/IPv6 address (e.g. `192.168.1.5`).
//! * A CIDR block (e.g. `192.168.1.0/24`), expanded with [`range::host_range`].
//! * An IPv4 range (e.g. `192.168.1.1-50` or `192.168.1.1-192.168.1.50`).

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use pnet::ipnetwork::Ipv4Network;

use crate::network::range::{self, Ipv4Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Host(IpAddr),
    Cidr(Ipv4Network),
    Range(Ipv4Range),
}

impl Target {
    pub fn hosts(&self) -> Box<dyn Iterator<Item = IpAddr>> {
        match self {
            Target::Host(addr) => Box::new(std::iter::once(*addr)),
            Target::Cidr(network) => Box::new(range::host_range(*network).to_iter()),
            Target::Range(ipv4_range) => Box::new(ipv4_range.to_iter()),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Ok(addr) = s.parse::<IpAddr>() {
            return Ok(Target::Host(addr));
        }

        if let Some(target) = parse_cidr(s)? {
            return Ok(target);
        }

        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }

        Err(format!("invalid target: {s}"))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host(addr) => write!(f, "{addr}"),
            Target::Cidr(network) => write!(f, "{network}"),
            Target::Range(r) => write!(f, "{}-{}", r.start_addr, r.end_addr),
        }
    }
}

/// Expands every target into one list of hosts.
///
/// Duplicates are dropped; the first occurrence keeps its position.
pub fn expand(targets: &[Target]) -> Vec<IpAddr> {
    let mut seen: HashSet<IpAddr> = HashSet::new();
    targets
        .iter()
        .flat_map(Target::hosts)
        .filter(|addr| seen.insert(*addr))
        .collect()
}

/// Parses CIDR notation like "192.168.1.0/24".
fn parse_cidr(s: &str) -> Result<Option<Target>, String> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid IP in CIDR '{ip_str}': {e}"))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| format!("Invalid prefix in CIDR '{prefix_str}': {e}"))?;

    let network = Ipv4Network::new(ipv4_addr, prefix).map_err(|e| e.to_string())?;
    Ok(Some(Target::Cidr(network)))
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<Target>, String> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let start_addr = start_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid start IP in range '{start_str}': {e}"))?;

    let end_addr = parse_range_end_addr(end_str, &start_addr)?;
    Ok(Some(Target::Range(Ipv4Range::new(start_addr, end_addr))))
}

/// Abbreviated ends replace the trailing octets of the start address.
fn parse_range_end_addr(end_str: &str, start_addr: &Ipv4Addr) -> Result<Ipv4Addr, String> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(str::parse::<u8>)
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| format!("Invalid end range '{end_str}': {e}"))?;

    if partial_octets.len() > 4 {
        return Err(format!("End range has too many octets: {end_str}"));
    }

    let mut end_octets = start_addr.octets();
    end_octets[4 - partial_octets.len()..].copy_from_slice(&partial_octets);
    Ok(Ipv4Addr::from(end_octets))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
