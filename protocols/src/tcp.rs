//! Half-open TCP probing: a crafted SYN frame out, SYN+ACK or RST back.

use std::net::Ipv4Addr;

use anyhow::Context;
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket, ipv4_checksum};
use pnet::util::MacAddr;

use crate::{ETH_HDR_LEN, IPV4_HDR_LEN, MIN_ETH_FRAME_NO_FCS, TCP_HDR_LEN, ethernet, ipv4};

/// Source port stamped on every probe; replies are matched against it.
pub const PROBE_SRC_PORT: u16 = 54321;
const WINDOW_SIZE: u16 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynProbe {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

/// The interesting bits of an inbound TCP segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpReply {
    pub src_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: u8,
}

impl TcpReply {
    /// SYN and ACK both set: the port is listening.
    pub fn is_syn_ack(&self) -> bool {
        self.flags & (TcpFlags::SYN | TcpFlags::ACK) == (TcpFlags::SYN | TcpFlags::ACK)
    }

    pub fn is_rst(&self) -> bool {
        self.flags & TcpFlags::RST != 0
    }

    /// Whether this segment answers a probe sent from `src_port` to `dst_port`.
    pub fn answers(&self, src_port: u16, dst_port: u16) -> bool {
        self.src_port == dst_port && self.dst_port == src_port
    }
}

pub fn create_syn(probe: &SynProbe) -> anyhow::Result<Vec<u8>> {
    let frame_len = ETH_HDR_LEN + IPV4_HDR_LEN + TCP_HDR_LEN;
    let mut buffer = vec![0u8; frame_len.max(MIN_ETH_FRAME_NO_FCS)];

    ethernet::make_header(&mut buffer, probe.src_mac, probe.dst_mac, EtherTypes::Ipv4)?;
    ipv4::make_header(
        &mut buffer[ETH_HDR_LEN..],
        (IPV4_HDR_LEN + TCP_HDR_LEN) as u16,
        IpNextHeaderProtocols::Tcp,
        probe.src_addr,
        probe.dst_addr,
    )?;

    let tcp_start = ETH_HDR_LEN + IPV4_HDR_LEN;
    let mut tcp = MutableTcpPacket::new(&mut buffer[tcp_start..tcp_start + TCP_HDR_LEN])
        .context("creating tcp packet")?;
    tcp.set_source(probe.src_port);
    tcp.set_destination(probe.dst_port);
    tcp.set_sequence(rand::random());
    tcp.set_acknowledgement(0);
    tcp.set_data_offset(5);
    tcp.set_flags(TcpFlags::SYN);
    tcp.set_window(WINDOW_SIZE);
    tcp.set_urgent_ptr(0);
    tcp.set_checksum(0);
    let csm = ipv4_checksum(&tcp.to_immutable(), &probe.src_addr, &probe.dst_addr);
    tcp.set_checksum(csm);

    Ok(buffer)
}

/// Parses a TCP-over-IPv4 frame; anything else yields `None`.
pub fn parse_reply(eth_packet: &EthernetPacket) -> anyhow::Result<Option<TcpReply>> {
    if eth_packet.get_ethertype() != EtherTypes::Ipv4 {
        return Ok(None);
    }
    let ip_packet = ipv4::get_packet(eth_packet)?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return Ok(None);
    }
    let tcp = TcpPacket::new(ip_packet.payload()).context(format!(
        "truncated or invalid TCP segment (payload len {})",
        ip_packet.payload().len()
    ))?;

    Ok(Some(TcpReply {
        src_addr: ip_packet.get_source(),
        src_port: tcp.get_source(),
        dst_port: tcp.get_destination(),
        flags: tcp.get_flags(),
    }))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
