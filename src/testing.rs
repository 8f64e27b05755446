//! Scripted transport and reply builders for tests.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::TraceError;
use crate::packet::option::TcpOption;
use crate::packet::{ipv4, ipv6, tcp, udp, ProbeCodec, ProbePacket};
use crate::protocol::Protocol;
use crate::socket::{Channel, Received, SocketFamily, Transport};

pub(crate) const LOCAL_PORT: u16 = 40123;

pub(crate) fn local_ip(family: SocketFamily) -> IpAddr {
    match family {
        SocketFamily::Ipv4 => IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)),
        SocketFamily::Ipv6 => IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x10)),
    }
}

/// Router address for hop `hop` of a scripted path.
pub(crate) fn router(family: SocketFamily, hop: u8) -> IpAddr {
    match family {
        SocketFamily::Ipv4 => IpAddr::V4(Ipv4Addr::new(10, 0, 0, hop)),
        SocketFamily::Ipv6 => IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, hop as u16)),
    }
}

/// Codec as a run against `dst_ip` would build it over a [`ScriptedTransport`].
pub(crate) fn codec(protocol: Protocol, dst_ip: IpAddr) -> ProbeCodec {
    ProbeCodec::new(protocol, dst_ip, protocol.default_port())
        .with_src_ip(local_ip(SocketFamily::from_ip(&dst_ip)))
        .with_src_port(LOCAL_PORT)
}

fn family(codec: &ProbeCodec) -> SocketFamily {
    SocketFamily::from_ip(&codec.get_dst_ip())
}

fn local(codec: &ProbeCodec) -> IpAddr {
    codec
        .get_src_ip()
        .unwrap_or_else(|| local_ip(family(codec)))
}

/// The probe as it left this host, IP header included.
fn quoted_probe(codec: &ProbeCodec, probe: &ProbePacket) -> Vec<u8> {
    let transport = match codec.get_protocol() {
        Protocol::Udp => {
            let src_port = match codec.get_src_port() {
                0 => LOCAL_PORT,
                port => port,
            };
            udp::build_udp_datagram(src_port, probe.dst_port, &probe.bytes)
        }
        Protocol::Icmp | Protocol::Tcp => probe.bytes.clone(),
    };
    let mut bytes = match (local(codec), codec.get_dst_ip()) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            ipv4::build_ipv4_header(src, dst, codec.get_protocol().ip_number(), 1, transport.len())
        }
        (IpAddr::V6(src), IpAddr::V6(dst)) => {
            let next_header = match codec.get_protocol() {
                Protocol::Icmp => 58,
                protocol => protocol.ip_number(),
            };
            ipv6::build_ipv6_header(src, dst, next_header, 1, transport.len())
        }
        _ => Vec::new(),
    };
    bytes.extend_from_slice(&transport);
    bytes
}

/// Packet as a raw socket of the codec's family returns it: IPv4 keeps the IP
/// header, IPv6 does not.
fn delivered(
    codec: &ProbeCodec,
    from: IpAddr,
    next_protocol: u8,
    payload: Vec<u8>,
    channel: Channel,
) -> Received {
    let bytes = match (from, local(codec)) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            let mut bytes = ipv4::build_ipv4_header(src, dst, next_protocol, 60, payload.len());
            bytes.extend_from_slice(&payload);
            bytes
        }
        _ => payload,
    };
    Received {
        bytes,
        from,
        at: Instant::now(),
        channel,
    }
}

/// An ICMP error from `from` quoting `probe`.
pub(crate) fn icmp_error(
    codec: &ProbeCodec,
    from: IpAddr,
    probe: &ProbePacket,
    icmp_type: u8,
    code: u8,
) -> Received {
    let mut payload = vec![icmp_type, code, 0, 0, 0, 0, 0, 0];
    payload.extend_from_slice(&quoted_probe(codec, probe));
    let next_protocol = match family(codec) {
        SocketFamily::Ipv4 => 1,
        SocketFamily::Ipv6 => 58,
    };
    delivered(codec, from, next_protocol, payload, Channel::Icmp)
}

pub(crate) fn time_exceeded(codec: &ProbeCodec, router: IpAddr, probe: &ProbePacket) -> Received {
    match family(codec) {
        SocketFamily::Ipv4 => icmp_error(codec, router, probe, 11, 0),
        SocketFamily::Ipv6 => icmp_error(codec, router, probe, 3, 0),
    }
}

/// Host unreachable sent by `router`.
pub(crate) fn host_unreachable(codec: &ProbeCodec, router: IpAddr, probe: &ProbePacket) -> Received {
    match family(codec) {
        SocketFamily::Ipv4 => icmp_error(codec, router, probe, 3, 1),
        SocketFamily::Ipv6 => icmp_error(codec, router, probe, 1, 3),
    }
}

pub(crate) fn port_unreachable(codec: &ProbeCodec, probe: &ProbePacket) -> Received {
    let dst_ip = codec.get_dst_ip();
    match family(codec) {
        SocketFamily::Ipv4 => icmp_error(codec, dst_ip, probe, 3, 3),
        SocketFamily::Ipv6 => icmp_error(codec, dst_ip, probe, 1, 4),
    }
}

pub(crate) fn echo_reply(codec: &ProbeCodec, probe: &ProbePacket) -> Received {
    let mut payload = probe.bytes.clone();
    payload[0] = match family(codec) {
        SocketFamily::Ipv4 => 0,
        SocketFamily::Ipv6 => 129,
    };
    let next_protocol = match family(codec) {
        SocketFamily::Ipv4 => 1,
        SocketFamily::Ipv6 => 58,
    };
    delivered(codec, codec.get_dst_ip(), next_protocol, payload, Channel::Icmp)
}

/// The destination's SYN-ACK to a TCP probe.
pub(crate) fn tcp_syn_ack(codec: &ProbeCodec, probe: &ProbePacket) -> Received {
    let syn = tcp::parse_segment(&probe.bytes).expect("probe is a TCP header");
    let options = [
        TcpOption::MaxSegmentSize(1400),
        TcpOption::SackPermitted,
        TcpOption::Timestamp {
            value: 7,
            echo: 1,
        },
        TcpOption::Nop,
        TcpOption::WindowScale(8),
    ];
    let payload = tcp::build_tcp_reply(
        syn.dst_port,
        syn.src_port,
        syn.sequence.wrapping_add(1),
        0x12,
        &options,
    );
    delivered(codec, codec.get_dst_ip(), 6, payload, Channel::Tcp)
}

/// Builds the replies to one probe, given the hop limit it was sent with.
pub(crate) type Responder = Box<dyn FnMut(&ProbePacket, u8) -> Vec<Received>>;

/// In-memory transport that answers probes from a script.
pub(crate) struct ScriptedTransport {
    responder: Responder,
    queue: VecDeque<Received>,
    hop_limit: u8,
    /// `(hop limit, token, send time)` of every probe sent
    pub sent: Vec<(u8, u16, Instant)>,
    pub close_count: usize,
    pub fail_sends: bool,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> ScriptedTransport
    where
        F: FnMut(&ProbePacket, u8) -> Vec<Received> + 'static,
    {
        ScriptedTransport {
            responder: Box::new(responder),
            queue: VecDeque::new(),
            hop_limit: 0,
            sent: Vec::new(),
            close_count: 0,
            fail_sends: false,
        }
    }

    /// A path where nothing ever answers.
    pub fn silent() -> ScriptedTransport {
        ScriptedTransport::new(|_, _| Vec::new())
    }

    pub fn tokens(&self) -> Vec<u16> {
        self.sent.iter().map(|(_, token, _)| *token).collect()
    }
}

impl Transport for ScriptedTransport {
    fn set_hop_limit(&mut self, hop_limit: u8) -> Result<(), TraceError> {
        self.hop_limit = hop_limit;
        Ok(())
    }

    fn send(&mut self, probe: &ProbePacket, _dst_ip: IpAddr) -> Result<Instant, TraceError> {
        if self.fail_sends {
            return Err(TraceError::Send(io::Error::from(io::ErrorKind::ConnectionRefused)));
        }
        let sent_at = Instant::now();
        self.sent.push((self.hop_limit, probe.token, sent_at));
        let replies = (self.responder)(probe, self.hop_limit);
        self.queue.extend(replies);
        Ok(sent_at)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Received>, TraceError> {
        match self.queue.pop_front() {
            Some(received) => Ok(Some(received)),
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn local_port(&self) -> u16 {
        LOCAL_PORT
    }

    fn close(&mut self) {
        self.close_count += 1;
    }
}
