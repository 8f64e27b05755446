use pnet_packet::ipv6::Ipv6Packet;
use std::net::IpAddr;

use super::QuotedIp;
use crate::error::PacketError;

pub const IPV6_HEADER_LEN: usize = 40;

/// Parses the original IPv6 header quoted inside an ICMPv6 error.
///
/// Extension headers are not walked; a probe never carries any.
pub fn parse_quoted(bytes: &[u8]) -> Result<QuotedIp<'_>, PacketError> {
    let header = Ipv6Packet::new(bytes).ok_or(PacketError::TooShort {
        expected: IPV6_HEADER_LEN,
        actual: bytes.len(),
    })?;
    if header.get_version() != 6 {
        return Err(PacketError::UnexpectedProtocol {
            layer: "IP version",
            value: header.get_version(),
        });
    }
    Ok(QuotedIp {
        destination: IpAddr::V6(header.get_destination()),
        protocol: header.get_next_header().0,
        transport: &bytes[IPV6_HEADER_LEN..],
    })
}

#[cfg(test)]
pub(crate) fn build_ipv6_header(
    src_ip: std::net::Ipv6Addr,
    dst_ip: std::net::Ipv6Addr,
    next_header: u8,
    hop_limit: u8,
    payload_len: usize,
) -> Vec<u8> {
    use pnet_packet::ip::IpNextHeaderProtocol;
    use pnet_packet::ipv6::MutableIpv6Packet;

    let mut buf = vec![0u8; IPV6_HEADER_LEN];
    let mut ipv6_packet = MutableIpv6Packet::new(&mut buf).unwrap();
    ipv6_packet.set_version(6);
    ipv6_packet.set_payload_length(payload_len as u16);
    ipv6_packet.set_next_header(IpNextHeaderProtocol::new(next_header));
    ipv6_packet.set_hop_limit(hop_limit);
    ipv6_packet.set_source(src_ip);
    ipv6_packet.set_destination(dst_ip);
    buf
}
