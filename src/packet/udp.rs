use pnet_packet::udp::UdpPacket;
use pnet_packet::Packet;

use crate::error::PacketError;

pub const UDP_HEADER_LEN: usize = 8;

/// Ports of a quoted UDP header, plus whatever part of the payload the router
/// chose to return.
pub struct QuotedUdp<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

pub fn parse_quoted(bytes: &[u8]) -> Result<QuotedUdp<'_>, PacketError> {
    if bytes.len() < UDP_HEADER_LEN {
        return Err(PacketError::TooShort {
            expected: UDP_HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let udp = UdpPacket::new(bytes).ok_or(PacketError::TooShort {
        expected: UDP_HEADER_LEN,
        actual: bytes.len(),
    })?;
    Ok(QuotedUdp {
        src_port: udp.get_source(),
        dst_port: udp.get_destination(),
        payload: &bytes[UDP_HEADER_LEN..],
    })
}

/// Datagram as the kernel would put it on the wire for a UDP probe.
#[cfg(test)]
pub(crate) fn build_udp_datagram(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    use pnet_packet::udp::MutableUdpPacket;

    let mut buf = vec![0u8; UDP_HEADER_LEN + payload.len()];
    let mut udp_packet = MutableUdpPacket::new(&mut buf).unwrap();
    udp_packet.set_source(src_port);
    udp_packet.set_destination(dst_port);
    udp_packet.set_length((UDP_HEADER_LEN + payload.len()) as u16);
    udp_packet.set_payload(payload);
    buf
}
