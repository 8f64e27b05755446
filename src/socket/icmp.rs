use super::SocketFamily;
use socket2::{Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct IcmpConfig {
    pub family: SocketFamily,
    pub bind_addr: Option<SocketAddr>,
}

impl IcmpConfig {
    pub fn new(family: SocketFamily) -> Self {
        Self {
            family,
            bind_addr: None,
        }
    }
}

/// Opens a raw ICMP (or ICMPv6) socket.
///
/// Datagram ICMP sockets are not used: they strip the IPv4 header and rewrite
/// the echo identifier, both of which the decoder relies on.
pub fn open_icmp_socket(config: &IcmpConfig) -> io::Result<Socket> {
    let proto = if config.family.is_v4() {
        Protocol::ICMPV4
    } else {
        Protocol::ICMPV6
    };
    let socket = Socket::new(config.family.to_domain(), Type::RAW, Some(proto))?;

    if let Some(bind_addr) = config.bind_addr {
        socket.bind(&bind_addr.into())?;
    }
    Ok(socket)
}
