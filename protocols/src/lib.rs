//! Raw frame crafting and parsing for the link-layer prober.
//!
//! Everything here is pure byte manipulation on top of `pnet::packet`; no sockets are opened.

pub mod arp;
pub mod ethernet;
pub mod ipv4;
pub mod tcp;

pub const ETH_HDR_LEN: usize = 14;
pub const ARP_LEN: usize = 28;
pub const IPV4_HDR_LEN: usize = 20;
pub const TCP_HDR_LEN: usize = 20;
/// Shortest Ethernet frame on the wire, excluding the frame check sequence.
pub const MIN_ETH_FRAME_NO_FCS: usize = 60;
