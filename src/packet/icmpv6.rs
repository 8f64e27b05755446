use pnet_packet::icmpv6::{Icmpv6Packet, Icmpv6Types};

use super::{IcmpMessage, PROBE_PAYLOAD_LEN};
use crate::error::PacketError;
use crate::node::{NotificationKind, Unreachable};

pub const ICMPV6_HEADER_LEN: usize = 8;
const PORT_UNREACHABLE: u8 = 4;

/// Builds an ICMPv6 echo request. The checksum is left zero; the kernel fills
/// it in for raw ICMPv6 sockets.
pub fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ICMPV6_HEADER_LEN + PROBE_PAYLOAD_LEN);
    buf.push(Icmpv6Types::EchoRequest.0);
    buf.push(0);
    buf.extend_from_slice(&[0, 0]);
    buf.extend_from_slice(&identifier.to_be_bytes());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&super::payload_pattern(sequence));
    buf
}

/// Classifies an ICMPv6 message. Raw ICMPv6 sockets never include the IPv6
/// header.
pub fn parse(bytes: &[u8]) -> Result<Option<IcmpMessage<'_>>, PacketError> {
    if bytes.len() < ICMPV6_HEADER_LEN {
        return Err(PacketError::TooShort {
            expected: ICMPV6_HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let icmp = Icmpv6Packet::new(bytes).ok_or(PacketError::TooShort {
        expected: ICMPV6_HEADER_LEN,
        actual: bytes.len(),
    })?;
    let code = icmp.get_icmpv6_code().0;
    let quoted = &bytes[ICMPV6_HEADER_LEN..];
    let icmp_type = icmp.get_icmpv6_type();
    let message = if icmp_type == Icmpv6Types::EchoReply {
        IcmpMessage::EchoReply {
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
        }
    } else if icmp_type == Icmpv6Types::TimeExceeded {
        IcmpMessage::Error {
            kind: NotificationKind::TimeExceeded,
            quoted,
        }
    } else if icmp_type == Icmpv6Types::DestinationUnreachable {
        let kind = if code == PORT_UNREACHABLE {
            NotificationKind::PortUnreachable
        } else {
            NotificationKind::DestinationUnreachable(Unreachable::from_icmpv6_code(code))
        };
        IcmpMessage::Error { kind, quoted }
    } else {
        // neighbor discovery and friends
        return Ok(None);
    };
    Ok(Some(message))
}

/// Identifier and sequence of a quoted echo request.
pub fn parse_quoted_echo(bytes: &[u8]) -> Result<(u16, u16), PacketError> {
    if bytes.len() < ICMPV6_HEADER_LEN {
        return Err(PacketError::TooShort {
            expected: ICMPV6_HEADER_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0] != Icmpv6Types::EchoRequest.0 {
        return Err(PacketError::UnexpectedProtocol {
            layer: "ICMPv6 type",
            value: bytes[0],
        });
    }
    Ok((
        u16::from_be_bytes([bytes[4], bytes[5]]),
        u16::from_be_bytes([bytes[6], bytes[7]]),
    ))
}
