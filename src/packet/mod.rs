//! Probe encoding and response decoding.
//!
//! Every probe carries a sequence token. UDP probes put it in the destination
//! port (`base_port + token`) and the first payload bytes, ICMP probes in the
//! echo sequence number, and TCP probes in the low half of the SYN sequence
//! number. Decoding finds the token again inside the original packet that a
//! router quotes back, so a response can be matched to its probe by value.

pub mod icmpv4;
pub mod icmpv6;
pub mod ipv4;
pub mod ipv6;
pub mod option;
pub mod tcp;
pub mod udp;

use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use crate::error::PacketError;
use crate::node::NotificationKind;
use crate::protocol::Protocol;
use crate::socket::{Channel, Received, SocketFamily};

/// Bytes of payload carried by UDP and ICMP probes.
pub const PROBE_PAYLOAD_LEN: usize = 32;

const IPPROTO_ICMPV6: u8 = 58;

/// Ephemeral range used for the TCP source port.
const TCP_SRC_PORT_RANGE: std::ops::Range<u16> = 33000..60000;

/// Payload for UDP and ICMP probes: the token followed by a fixed pattern.
pub(crate) fn payload_pattern(token: u16) -> Vec<u8> {
    let mut payload = vec![0u8; PROBE_PAYLOAD_LEN];
    payload[0..2].copy_from_slice(&token.to_be_bytes());
    for (i, byte) in payload.iter_mut().enumerate().skip(2) {
        *byte = 0x40 + i as u8;
    }
    payload
}

/// An encoded probe, ready for the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbePacket {
    pub token: u16,
    pub hop_limit: u8,
    /// Transport-layer bytes (UDP payload, ICMP message or TCP header).
    pub bytes: Vec<u8>,
    /// Destination port for UDP probes; zero for raw sends.
    pub dst_port: u16,
}

/// The original IP header quoted inside an ICMP error.
pub struct QuotedIp<'a> {
    pub destination: IpAddr,
    pub protocol: u8,
    pub transport: &'a [u8],
}

#[derive(Debug)]
pub(crate) enum IcmpMessage<'a> {
    EchoReply { identifier: u16, sequence: u16 },
    Error {
        kind: NotificationKind,
        quoted: &'a [u8],
    },
}

/// A classified response that belongs to this run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub source: IpAddr,
    pub kind: NotificationKind,
    pub token: u16,
    pub received_at: Instant,
}

impl Response {
    /// Whether the response proves the probe reached `dst_ip`.
    pub fn is_from_destination(&self, dst_ip: IpAddr) -> bool {
        self.source == dst_ip || self.kind.is_final()
    }
}

/// Result of decoding one inbound packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Response(Response),
    /// Malformed or unrelated to this run.
    Unrecognized,
}

/// Encoder/decoder bound to one run's correlation values.
#[derive(Clone, Debug)]
pub struct ProbeCodec {
    protocol: Protocol,
    family: SocketFamily,
    dst_ip: IpAddr,
    src_ip: Option<IpAddr>,
    identifier: u16,
    port: u16,
    src_port: u16,
}

impl ProbeCodec {
    /// Creates a codec with a random identifier.
    ///
    /// `port` is the UDP base port or the TCP destination port; it is ignored
    /// for ICMP.
    pub fn new(protocol: Protocol, dst_ip: IpAddr, port: u16) -> ProbeCodec {
        let src_port = match protocol {
            Protocol::Tcp => rand::thread_rng().gen_range(TCP_SRC_PORT_RANGE),
            _ => 0,
        };
        ProbeCodec {
            protocol,
            family: SocketFamily::from_ip(&dst_ip),
            dst_ip,
            src_ip: None,
            identifier: rand::random::<u16>(),
            port,
            src_port,
        }
    }
    /// Sets the local address used in the TCP pseudo-header checksum.
    pub fn with_src_ip(mut self, src_ip: IpAddr) -> ProbeCodec {
        self.src_ip = Some(src_ip);
        self
    }
    /// Sets the local port responses must be addressed to. Zero disables the
    /// check.
    pub fn with_src_port(mut self, src_port: u16) -> ProbeCodec {
        if src_port != 0 || self.protocol != Protocol::Tcp {
            self.src_port = src_port;
        }
        self
    }
    pub fn with_identifier(mut self, identifier: u16) -> ProbeCodec {
        self.identifier = identifier;
        self
    }
    pub fn get_protocol(&self) -> Protocol {
        self.protocol
    }
    pub fn get_identifier(&self) -> u16 {
        self.identifier
    }
    pub fn get_src_port(&self) -> u16 {
        self.src_port
    }
    pub fn get_dst_ip(&self) -> IpAddr {
        self.dst_ip
    }
    pub fn get_src_ip(&self) -> Option<IpAddr> {
        self.src_ip
    }
    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Size of one probe on the wire, IP header included.
    pub fn wire_len(&self) -> usize {
        let ip_header = match self.family {
            SocketFamily::Ipv4 => ipv4::IPV4_HEADER_LEN,
            SocketFamily::Ipv6 => ipv6::IPV6_HEADER_LEN,
        };
        let transport = match self.protocol {
            Protocol::Udp => udp::UDP_HEADER_LEN + PROBE_PAYLOAD_LEN,
            Protocol::Icmp => icmpv4::ICMPV4_HEADER_LEN + PROBE_PAYLOAD_LEN,
            Protocol::Tcp => {
                tcp::TCP_HEADER_LEN + option::encode_options(&tcp::syn_options(0)).len()
            }
        };
        ip_header + transport
    }

    pub fn encode(&self, hop_limit: u8, token: u16) -> ProbePacket {
        let (bytes, dst_port) = match (self.protocol, self.family) {
            (Protocol::Udp, _) => (payload_pattern(token), self.port.wrapping_add(token)),
            (Protocol::Icmp, SocketFamily::Ipv4) => {
                (icmpv4::build_echo_request(self.identifier, token), 0)
            }
            (Protocol::Icmp, SocketFamily::Ipv6) => {
                (icmpv6::build_echo_request(self.identifier, token), 0)
            }
            (Protocol::Tcp, _) => {
                let src_ip = self.src_ip.unwrap_or(match self.family {
                    SocketFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    SocketFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                });
                let sequence = (self.identifier as u32) << 16 | token as u32;
                let bytes = tcp::build_tcp_syn(
                    src_ip,
                    self.dst_ip,
                    self.src_port,
                    self.port,
                    sequence,
                    &tcp::syn_options(timestamp_millis()),
                );
                (bytes, 0)
            }
        };
        ProbePacket {
            token,
            hop_limit,
            bytes,
            dst_port,
        }
    }

    /// Decodes one inbound packet. Anything that cannot be attributed to this
    /// run is `Unrecognized`; malformed packets are logged and dropped.
    pub fn decode(&self, received: &Received) -> Decoded {
        match self.try_decode(received) {
            Ok(response) => Decoded::Response(response),
            Err(PacketError::Mismatch) => {
                trace!(from = %received.from, "ignored packet of another flow");
                Decoded::Unrecognized
            }
            Err(e) => {
                debug!(from = %received.from, error = %e, "dropped malformed packet");
                Decoded::Unrecognized
            }
        }
    }

    fn try_decode(&self, received: &Received) -> Result<Response, PacketError> {
        match received.channel {
            Channel::Icmp => self.decode_icmp(received),
            Channel::Tcp => self.decode_tcp_reply(received),
        }
    }

    fn decode_icmp(&self, received: &Received) -> Result<Response, PacketError> {
        let (source, message) = match self.family {
            SocketFamily::Ipv4 => {
                let (header, icmp) = ipv4::split_header(&received.bytes)?;
                (IpAddr::V4(header.get_source()), icmpv4::parse(icmp)?)
            }
            SocketFamily::Ipv6 => (received.from, icmpv6::parse(&received.bytes)?),
        };
        match message.ok_or(PacketError::Mismatch)? {
            IcmpMessage::EchoReply {
                identifier,
                sequence,
            } => {
                if self.protocol != Protocol::Icmp || identifier != self.identifier {
                    return Err(PacketError::Mismatch);
                }
                Ok(Response {
                    source,
                    kind: NotificationKind::EchoReply,
                    token: sequence,
                    received_at: received.at,
                })
            }
            IcmpMessage::Error { kind, quoted } => {
                let quoted = match self.family {
                    SocketFamily::Ipv4 => ipv4::parse_quoted(quoted)?,
                    SocketFamily::Ipv6 => ipv6::parse_quoted(quoted)?,
                };
                if quoted.destination != self.dst_ip {
                    return Err(PacketError::Mismatch);
                }
                let token = self.quoted_token(&quoted)?;
                Ok(Response {
                    source,
                    kind,
                    token,
                    received_at: received.at,
                })
            }
        }
    }

    fn quoted_token(&self, quoted: &QuotedIp<'_>) -> Result<u16, PacketError> {
        let expected = match (self.protocol, self.family) {
            (Protocol::Icmp, SocketFamily::Ipv6) => IPPROTO_ICMPV6,
            (protocol, _) => protocol.ip_number(),
        };
        if quoted.protocol != expected {
            // another process's traffic to the same destination
            return Err(PacketError::Mismatch);
        }
        match self.protocol {
            Protocol::Udp => {
                let udp = udp::parse_quoted(quoted.transport)?;
                if self.src_port != 0 && udp.src_port != self.src_port {
                    return Err(PacketError::Mismatch);
                }
                let token = udp.dst_port.wrapping_sub(self.port);
                if udp.payload.len() >= 2 && udp.payload[0..2] != token.to_be_bytes() {
                    return Err(PacketError::Mismatch);
                }
                Ok(token)
            }
            Protocol::Icmp => {
                let (identifier, sequence) = match self.family {
                    SocketFamily::Ipv4 => icmpv4::parse_quoted_echo(quoted.transport)?,
                    SocketFamily::Ipv6 => icmpv6::parse_quoted_echo(quoted.transport)?,
                };
                if identifier != self.identifier {
                    return Err(PacketError::Mismatch);
                }
                Ok(sequence)
            }
            Protocol::Tcp => {
                let tcp = tcp::parse_quoted(quoted.transport)?;
                if tcp.src_port != self.src_port || tcp.dst_port != self.port {
                    return Err(PacketError::Mismatch);
                }
                self.token_from_sequence(tcp.sequence)
            }
        }
    }

    fn decode_tcp_reply(&self, received: &Received) -> Result<Response, PacketError> {
        if self.protocol != Protocol::Tcp {
            return Err(PacketError::Mismatch);
        }
        let (source, segment) = match self.family {
            SocketFamily::Ipv4 => {
                let (header, segment) = ipv4::split_header(&received.bytes)?;
                let protocol = header.get_next_level_protocol().0;
                if protocol != Protocol::Tcp.ip_number() {
                    return Err(PacketError::UnexpectedProtocol {
                        layer: "IP",
                        value: protocol,
                    });
                }
                (IpAddr::V4(header.get_source()), segment)
            }
            SocketFamily::Ipv6 => (received.from, received.bytes.as_slice()),
        };
        if source != self.dst_ip {
            return Err(PacketError::Mismatch);
        }
        let segment = tcp::parse_segment(segment)?;
        if segment.src_port != self.port || segment.dst_port != self.src_port {
            return Err(PacketError::Mismatch);
        }
        if !segment.is_syn_ack() && !segment.is_rst() {
            return Err(PacketError::Mismatch);
        }
        let token = self.token_from_sequence(segment.acknowledgement.wrapping_sub(1))?;
        Ok(Response {
            source,
            kind: NotificationKind::TransportReply,
            token,
            received_at: received.at,
        })
    }

    fn token_from_sequence(&self, sequence: u32) -> Result<u16, PacketError> {
        if (sequence >> 16) as u16 != self.identifier {
            return Err(PacketError::Mismatch);
        }
        Ok(sequence as u16)
    }
}

fn timestamp_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const ROUTER_V4: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const DST_V4: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 9);

    fn router_v6() -> Ipv6Addr {
        "2001:db8::1".parse().unwrap()
    }

    fn dst_v6() -> Ipv6Addr {
        "2001:db8:ffff::9".parse().unwrap()
    }

    fn codec(protocol: Protocol, dst_ip: IpAddr) -> ProbeCodec {
        let codec = ProbeCodec::new(protocol, dst_ip, protocol.default_port())
            .with_identifier(0x4242)
            .with_src_port(40123);
        match dst_ip {
            IpAddr::V4(_) => codec.with_src_ip(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))),
            IpAddr::V6(_) => codec.with_src_ip(IpAddr::V6("2001:db8::10".parse().unwrap())),
        }
    }

    fn token_of(decoded: Decoded) -> Option<u16> {
        match decoded {
            Decoded::Response(response) => Some(response.token),
            Decoded::Unrecognized => None,
        }
    }

    #[test]
    fn test_echo_request_carries_identifier() {
        let codec = codec(Protocol::Icmp, IpAddr::V4(DST_V4));
        assert_eq!(codec.get_identifier(), 0x4242);
        let probe = codec.encode(1, 9);
        assert_eq!(&probe.bytes[4..6], &codec.get_identifier().to_be_bytes());
        assert_eq!(&probe.bytes[6..8], &9u16.to_be_bytes());
    }

    #[test]
    fn test_token_round_trip_every_variant() {
        let targets = [IpAddr::V4(DST_V4), IpAddr::V6(dst_v6())];
        for dst_ip in targets {
            let router = match dst_ip {
                IpAddr::V4(_) => IpAddr::V4(ROUTER_V4),
                IpAddr::V6(_) => IpAddr::V6(router_v6()),
            };
            for protocol in [Protocol::Udp, Protocol::Icmp, Protocol::Tcp] {
                let codec = codec(protocol, dst_ip);
                for token in [1u16, 77, 2549] {
                    let probe = codec.encode(5, token);
                    let received = testing::time_exceeded(&codec, router, &probe);
                    assert_eq!(
                        token_of(codec.decode(&received)),
                        Some(token),
                        "{} over {}",
                        protocol,
                        dst_ip
                    );
                }
            }
        }
    }

    #[test]
    fn test_udp_destination_port_carries_token() {
        let codec = codec(Protocol::Udp, IpAddr::V4(DST_V4));
        let probe = codec.encode(3, 12);
        assert_eq!(probe.dst_port, 33434 + 12);
        assert_eq!(&probe.bytes[0..2], &12u16.to_be_bytes());
    }

    #[test]
    fn test_header_only_quote_is_enough() {
        let codec = codec(Protocol::Udp, IpAddr::V4(DST_V4));
        let probe = codec.encode(3, 9);
        let mut received = testing::time_exceeded(&codec, IpAddr::V4(ROUTER_V4), &probe);
        // outer IP (20) + ICMP (8) + quoted IP (20) + UDP header (8)
        received.bytes.truncate(56);
        assert_eq!(token_of(codec.decode(&received)), Some(9));
    }

    #[test]
    fn test_destination_replies() {
        let udp = codec(Protocol::Udp, IpAddr::V4(DST_V4));
        let probe = udp.encode(9, 30);
        match udp.decode(&testing::port_unreachable(&udp, &probe)) {
            Decoded::Response(response) => {
                assert_eq!(response.kind, NotificationKind::PortUnreachable);
                assert_eq!(response.source, IpAddr::V4(DST_V4));
                assert!(response.is_from_destination(IpAddr::V4(DST_V4)));
            }
            Decoded::Unrecognized => panic!("port unreachable not recognized"),
        }

        for dst_ip in [IpAddr::V4(DST_V4), IpAddr::V6(dst_v6())] {
            let icmp = codec(Protocol::Icmp, dst_ip);
            let reply = testing::echo_reply(&icmp, &icmp.encode(4, 11));
            assert_eq!(token_of(icmp.decode(&reply)), Some(11));

            let tcp = codec(Protocol::Tcp, dst_ip);
            let reply = testing::tcp_syn_ack(&tcp, &tcp.encode(6, 21));
            match tcp.decode(&reply) {
                Decoded::Response(response) => {
                    assert_eq!(response.token, 21);
                    assert_eq!(response.kind, NotificationKind::TransportReply);
                }
                Decoded::Unrecognized => panic!("SYN-ACK not recognized"),
            }
        }
    }

    #[test]
    fn test_foreign_traffic_is_unrecognized() {
        let ours = codec(Protocol::Icmp, IpAddr::V4(DST_V4));
        let theirs = ProbeCodec::new(Protocol::Icmp, IpAddr::V4(DST_V4), 0).with_identifier(0x1111);
        let probe = theirs.encode(2, 5);
        let received = testing::time_exceeded(&theirs, IpAddr::V4(ROUTER_V4), &probe);
        assert_eq!(ours.decode(&received), Decoded::Unrecognized);

        // same identifier, different destination
        let elsewhere = codec(Protocol::Icmp, IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)));
        let received = testing::time_exceeded(&elsewhere, IpAddr::V4(ROUTER_V4), &elsewhere.encode(2, 5));
        assert_eq!(ours.decode(&received), Decoded::Unrecognized);

        // UDP probes from another socket
        let udp = codec(Protocol::Udp, IpAddr::V4(DST_V4));
        let other_socket = udp.clone().with_src_port(50000);
        let received = testing::time_exceeded(&other_socket, IpAddr::V4(ROUTER_V4), &other_socket.encode(2, 5));
        assert_eq!(udp.decode(&received), Decoded::Unrecognized);

        // a TCP probe's quote seen by a UDP run
        let tcp = codec(Protocol::Tcp, IpAddr::V4(DST_V4));
        let received = testing::time_exceeded(&tcp, IpAddr::V4(ROUTER_V4), &tcp.encode(2, 5));
        assert_eq!(udp.decode(&received), Decoded::Unrecognized);
    }

    #[test]
    fn test_malformed_tcp_option_is_unrecognized() {
        let tcp = codec(Protocol::Tcp, IpAddr::V4(DST_V4));
        let mut probe = tcp.encode(7, 3);
        // timestamp option declared with length 12
        probe.bytes[tcp::TCP_HEADER_LEN + 7] = 12;
        let received = testing::time_exceeded(&tcp, IpAddr::V4(ROUTER_V4), &probe);
        assert_eq!(tcp.decode(&received), Decoded::Unrecognized);

        let mut reply = testing::tcp_syn_ack(&tcp, &tcp.encode(7, 4));
        let options_at = reply.bytes.len() - 20;
        reply.bytes[options_at + 1] = 9;
        assert_eq!(tcp.decode(&reply), Decoded::Unrecognized);
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        let codec = codec(Protocol::Udp, IpAddr::V4(DST_V4));
        for bytes in [vec![], vec![0x45], vec![0xff; 64], vec![0x45; 27]] {
            let received = Received {
                bytes,
                from: IpAddr::V4(ROUTER_V4),
                at: Instant::now(),
                channel: Channel::Icmp,
            };
            assert_eq!(codec.decode(&received), Decoded::Unrecognized);
        }
    }

    #[test]
    fn test_wire_len() {
        assert_eq!(codec(Protocol::Udp, IpAddr::V4(DST_V4)).wire_len(), 60);
        assert_eq!(codec(Protocol::Icmp, IpAddr::V6(dst_v6())).wire_len(), 80);
        assert_eq!(codec(Protocol::Tcp, IpAddr::V4(DST_V4)).wire_len(), 60);
    }
}
