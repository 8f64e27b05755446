use std::fmt;
use std::str::FromStr;

use crate::error::TraceError;

/// Supported probe protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Protocol {
    /// ICMP (or ICMPv6) echo request.
    Icmp,
    /// TCP SYN sent through a raw socket.
    Tcp,
    /// UDP datagram to an unlikely port.
    #[default]
    Udp,
}

impl Protocol {
    /// Default destination port: UDP base port or TCP service port.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Udp => 33434,
            Protocol::Tcp => 80,
            Protocol::Icmp => 0,
        }
    }

    /// IP protocol number carried in the probe's IP header (IPv4 numbering).
    pub fn ip_number(&self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

impl FromStr for Protocol {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" | "icmpv4" | "icmpv6" => Ok(Protocol::Icmp),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(TraceError::UnsupportedProtocol(other.to_string())),
        }
    }
}
