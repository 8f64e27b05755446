use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::Packet;

use super::{IcmpMessage, PROBE_PAYLOAD_LEN};
use crate::error::PacketError;
use crate::node::{NotificationKind, Unreachable};

pub const ICMPV4_HEADER_LEN: usize = 8;
const PORT_UNREACHABLE: u8 = 3;

pub fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buf = vec![0u8; ICMPV4_HEADER_LEN + PROBE_PAYLOAD_LEN];
    if let Some(mut icmp_packet) = MutableEchoRequestPacket::new(&mut buf) {
        icmp_packet.set_icmp_type(IcmpTypes::EchoRequest);
        icmp_packet.set_icmp_code(IcmpCode::new(0));
        icmp_packet.set_identifier(identifier);
        icmp_packet.set_sequence_number(sequence);
        icmp_packet.set_payload(&super::payload_pattern(sequence));
        let checksum = pnet_packet::util::checksum(icmp_packet.packet(), 1);
        icmp_packet.set_checksum(checksum);
    }
    buf
}

/// Classifies an ICMPv4 message (IP header already removed).
///
/// Returns `None` for message types a trace never waits for.
pub fn parse(bytes: &[u8]) -> Result<Option<IcmpMessage<'_>>, PacketError> {
    let icmp = IcmpPacket::new(bytes).ok_or(PacketError::TooShort {
        expected: ICMPV4_HEADER_LEN,
        actual: bytes.len(),
    })?;
    if bytes.len() < ICMPV4_HEADER_LEN {
        return Err(PacketError::TooShort {
            expected: ICMPV4_HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let code = icmp.get_icmp_code().0;
    let quoted = &bytes[ICMPV4_HEADER_LEN..];
    let message = match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => IcmpMessage::EchoReply {
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
        },
        IcmpTypes::TimeExceeded => IcmpMessage::Error {
            kind: NotificationKind::TimeExceeded,
            quoted,
        },
        IcmpTypes::DestinationUnreachable if code == PORT_UNREACHABLE => IcmpMessage::Error {
            kind: NotificationKind::PortUnreachable,
            quoted,
        },
        IcmpTypes::DestinationUnreachable => IcmpMessage::Error {
            kind: NotificationKind::DestinationUnreachable(Unreachable::from_icmpv4_code(code)),
            quoted,
        },
        _ => return Ok(None),
    };
    Ok(Some(message))
}

/// Identifier and sequence of a quoted echo request.
pub fn parse_quoted_echo(bytes: &[u8]) -> Result<(u16, u16), PacketError> {
    if bytes.len() < ICMPV4_HEADER_LEN {
        return Err(PacketError::TooShort {
            expected: ICMPV4_HEADER_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0] != IcmpTypes::EchoRequest.0 {
        return Err(PacketError::UnexpectedProtocol {
            layer: "ICMP type",
            value: bytes[0],
        });
    }
    Ok((
        u16::from_be_bytes([bytes[4], bytes[5]]),
        u16::from_be_bytes([bytes[6], bytes[7]]),
    ))
}
