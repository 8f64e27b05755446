use pnet_packet::ipv4::Ipv4Packet;
use std::net::IpAddr;
#[cfg(test)]
use std::net::Ipv4Addr;

use super::QuotedIp;
use crate::error::PacketError;

pub const IPV4_HEADER_LEN: usize = 20;

/// Splits an IPv4 packet into its header and the bytes after it.
///
/// The header length field is trusted over the total length field, which some
/// platforms rewrite on raw sockets.
pub fn split_header(bytes: &[u8]) -> Result<(Ipv4Packet<'_>, &[u8]), PacketError> {
    let header = Ipv4Packet::new(bytes).ok_or(PacketError::TooShort {
        expected: IPV4_HEADER_LEN,
        actual: bytes.len(),
    })?;
    if header.get_version() != 4 {
        return Err(PacketError::UnexpectedProtocol {
            layer: "IP version",
            value: header.get_version(),
        });
    }
    let header_len = header.get_header_length() as usize * 4;
    if header_len < IPV4_HEADER_LEN || bytes.len() < header_len {
        return Err(PacketError::TooShort {
            expected: header_len.max(IPV4_HEADER_LEN),
            actual: bytes.len(),
        });
    }
    Ok((header, &bytes[header_len..]))
}

/// Parses the original IPv4 header quoted inside an ICMP error.
pub fn parse_quoted(bytes: &[u8]) -> Result<QuotedIp<'_>, PacketError> {
    let (header, transport) = split_header(bytes)?;
    Ok(QuotedIp {
        destination: IpAddr::V4(header.get_destination()),
        protocol: header.get_next_level_protocol().0,
        transport,
    })
}

#[cfg(test)]
pub(crate) fn build_ipv4_header(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    next_protocol: u8,
    ttl: u8,
    payload_len: usize,
) -> Vec<u8> {
    use pnet_packet::ip::IpNextHeaderProtocol;
    use pnet_packet::ipv4::{Ipv4Flags, MutableIpv4Packet};

    let mut buf = vec![0u8; IPV4_HEADER_LEN];
    let mut ipv4_packet = MutableIpv4Packet::new(&mut buf).unwrap();
    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length(5);
    ipv4_packet.set_total_length((IPV4_HEADER_LEN + payload_len) as u16);
    ipv4_packet.set_identification(rand::random::<u16>());
    ipv4_packet.set_flags(Ipv4Flags::DontFragment);
    ipv4_packet.set_ttl(ttl);
    ipv4_packet.set_next_level_protocol(IpNextHeaderProtocol::new(next_protocol));
    ipv4_packet.set_source(src_ip);
    ipv4_packet.set_destination(dst_ip);
    let checksum = pnet_packet::ipv4::checksum(&ipv4_packet.to_immutable());
    ipv4_packet.set_checksum(checksum);
    buf
}
