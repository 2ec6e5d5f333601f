use std::net::Ipv4Addr;

use anyhow::Context;
use pnet::packet::Packet;
use pnet::packet::ethernet::EthernetPacket;
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet, checksum};

use crate::IPV4_HDR_LEN;

/// Writes a 20-byte IPv4 header (no options) into the front of `buf` and fills in its checksum.
pub fn make_header(
    buf: &mut [u8],
    total_length: u16,
    next_protocol: IpNextHeaderProtocol,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
) -> anyhow::Result<()> {
    let header = buf.get_mut(..IPV4_HDR_LEN).context("buffer too small for an IPv4 header")?;
    let mut ipv4 = MutableIpv4Packet::new(header).context("creating ipv4 packet")?;
    ipv4.set_version(4);
    ipv4.set_header_length(5);
    ipv4.set_dscp(0);
    ipv4.set_ecn(0);
    ipv4.set_total_length(total_length);
    ipv4.set_identification(rand::random());
    ipv4.set_flags(2); // don't fragment
    ipv4.set_fragment_offset(0);
    ipv4.set_ttl(64);
    ipv4.set_next_level_protocol(next_protocol);
    ipv4.set_source(src_addr);
    ipv4.set_destination(dst_addr);

    ipv4.set_checksum(0);
    let csm = checksum(&ipv4.to_immutable());
    ipv4.set_checksum(csm);
    Ok(())
}

pub fn get_packet<'a>(eth_packet: &'a EthernetPacket<'a>) -> anyhow::Result<Ipv4Packet<'a>> {
    Ipv4Packet::new(eth_packet.payload()).context(format!(
        "truncated or invalid IPv4 packet (payload len {})",
        eth_packet.payload().len()
    ))
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
    use pnet::packet::ip::IpNextHeaderProtocols;

    #[test]
    fn header_has_valid_checksum() {
        let mut buf = [0u8; IPV4_HDR_LEN];
        let src = Ipv4Addr::new(192, 168, 1, 10);
        let dst = Ipv4Addr::new(192, 168, 1, 20);

        make_header(&mut buf, 40, IpNextHeaderProtocols::Tcp, src, dst).unwrap();

        let pkt = Ipv4Packet::new(&buf).unwrap();
        assert_eq!(pkt.get_version(), 4);
        assert_eq!(pkt.get_header_length(), 5);
        assert_eq!(pkt.get_total_length(), 40);
        assert_eq!(pkt.get_ttl(), 64);
        assert_eq!(pkt.get_next_level_protocol(), IpNextHeaderProtocols::Tcp);
        assert_eq!(pkt.get_source(), src);
        assert_eq!(pkt.get_destination(), dst);
        assert_eq!(pkt.get_checksum(), checksum(&pkt));
    }

    #[test]
    fn header_rejects_short_buffer() {
        let mut buf = [0u8; IPV4_HDR_LEN - 1];
        let addr = Ipv4Addr::LOCALHOST;
        assert!(make_header(&mut buf, 20, IpNextHeaderProtocols::Tcp, addr, addr).is_err());
    }
}
