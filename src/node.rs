use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Hop role in traceroute results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// Transit router (non-final hop)
    Hop,
    /// Final destination
    Destination,
}

/// Reason given by a destination-unreachable notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unreachable {
    Network,
    Host,
    Protocol,
    FragmentationNeeded,
    SourceRouteFailed,
    Prohibited,
    Other(u8),
}

impl Unreachable {
    /// Maps an ICMPv4 destination-unreachable code. Port unreachable (3) is
    /// classified separately by the decoder.
    pub fn from_icmpv4_code(code: u8) -> Unreachable {
        match code {
            0 | 6 | 11 => Unreachable::Network,
            1 | 7 | 12 => Unreachable::Host,
            2 => Unreachable::Protocol,
            4 => Unreachable::FragmentationNeeded,
            5 => Unreachable::SourceRouteFailed,
            9 | 10 | 13 => Unreachable::Prohibited,
            other => Unreachable::Other(other),
        }
    }

    /// Maps an ICMPv6 destination-unreachable code. Port unreachable (4) is
    /// classified separately by the decoder.
    pub fn from_icmpv6_code(code: u8) -> Unreachable {
        match code {
            0 => Unreachable::Network,
            1 | 5 | 6 => Unreachable::Prohibited,
            3 => Unreachable::Host,
            other => Unreachable::Other(other),
        }
    }
}

impl fmt::Display for Unreachable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unreachable::Network => write!(f, "!N"),
            Unreachable::Host => write!(f, "!H"),
            Unreachable::Protocol => write!(f, "!P"),
            Unreachable::FragmentationNeeded => write!(f, "!F"),
            Unreachable::SourceRouteFailed => write!(f, "!S"),
            Unreachable::Prohibited => write!(f, "!X"),
            Unreachable::Other(code) => write!(f, "!{}", code),
        }
    }
}

/// Classification of an inbound response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    /// Hop limit reached zero at a router.
    TimeExceeded,
    /// Destination-unreachable other than port unreachable.
    DestinationUnreachable(Unreachable),
    /// Echo reply to an ICMP probe.
    EchoReply,
    /// Port unreachable, the normal end of a UDP trace.
    PortUnreachable,
    /// SYN-ACK or RST sent back by the destination for a TCP probe.
    TransportReply,
}

impl NotificationKind {
    /// Kinds that only the probed destination produces.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            NotificationKind::EchoReply
                | NotificationKind::PortUnreachable
                | NotificationKind::TransportReply
        )
    }

    /// Marker printed after the latency, e.g. `!H`.
    pub fn annotation(&self) -> Option<String> {
        match self {
            NotificationKind::DestinationUnreachable(reason) => Some(reason.to_string()),
            _ => None,
        }
    }
}

/// Probe result for a single attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Sequence token of the probe that was answered
    pub seq: u16,
    /// Responder IP address
    pub ip_addr: IpAddr,
    /// Resolved host name, or the IP string if reverse lookup is off or fails
    pub host_name: String,
    /// Hop limit the probe was sent with
    pub hop: u8,
    /// Traceroute hop role
    pub node_type: NodeType,
    /// What kind of notification came back
    pub kind: NotificationKind,
    /// Round-trip time
    pub rtt: Duration,
}
