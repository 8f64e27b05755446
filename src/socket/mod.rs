//! Blocking sockets used to send probes and collect responses.

pub mod icmp;
pub mod tcp;
pub mod transport;
pub mod udp;

pub use transport::SocketTransport;

use socket2::Socket;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::error::TraceError;
use crate::packet::ProbePacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFamily {
    Ipv4,
    Ipv6,
}

impl SocketFamily {
    pub fn from_ip(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => SocketFamily::Ipv4,
            IpAddr::V6(_) => SocketFamily::Ipv6,
        }
    }

    pub fn is_v4(&self) -> bool {
        matches!(self, SocketFamily::Ipv4)
    }

    pub fn to_domain(&self) -> socket2::Domain {
        match self {
            SocketFamily::Ipv4 => socket2::Domain::IPV4,
            SocketFamily::Ipv6 => socket2::Domain::IPV6,
        }
    }

    /// Wildcard address with an ephemeral port.
    pub fn unspecified(&self) -> SocketAddr {
        match self {
            SocketFamily::Ipv4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketFamily::Ipv6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        }
    }
}

/// Which socket a packet arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// ICMP or ICMPv6 socket.
    Icmp,
    /// Raw TCP socket, for replies sent straight back by the destination.
    Tcp,
}

/// One inbound packet, as read from a socket.
#[derive(Debug, Clone)]
pub struct Received {
    /// Raw bytes. IPv4 raw sockets include the IP header, IPv6 ones do not.
    pub bytes: Vec<u8>,
    pub from: IpAddr,
    pub at: Instant,
    pub channel: Channel,
}

/// Send and receive primitives the hop scheduler drives.
pub trait Transport {
    /// Sets the hop limit used by the next send.
    fn set_hop_limit(&mut self, hop_limit: u8) -> Result<(), TraceError>;
    /// Sends one probe and returns the send timestamp.
    fn send(&mut self, probe: &ProbePacket, dst_ip: IpAddr) -> Result<Instant, TraceError>;
    /// Waits at most `timeout` for one packet. `Ok(None)` means nothing arrived.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Received>, TraceError>;
    /// Local port of the probe socket, or zero when the kernel does not pick one.
    fn local_port(&self) -> u16;
    /// Releases all sockets. Calling it twice is harmless.
    fn close(&mut self);
}

/// Sets TTL (IPv4) or unicast hops (IPv6) on a socket.
pub(crate) fn set_hop_limit(socket: &Socket, family: SocketFamily, hop_limit: u8) -> io::Result<()> {
    match family {
        SocketFamily::Ipv4 => socket.set_ttl(hop_limit as u32),
        SocketFamily::Ipv6 => socket.set_unicast_hops_v6(hop_limit as u32),
    }
}
