use super::SocketFamily;
use socket2::{Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct UdpConfig {
    pub family: SocketFamily,
    pub bind_addr: Option<SocketAddr>,
}

impl UdpConfig {
    pub fn new(family: SocketFamily) -> Self {
        Self {
            family,
            bind_addr: None,
        }
    }
}

/// Opens the datagram socket UDP probes are sent from.
///
/// The socket is always bound so the kernel assigns the source port before
/// the first probe; the decoder matches quoted headers against it.
pub fn open_udp_socket(config: &UdpConfig) -> io::Result<Socket> {
    let socket = Socket::new(config.family.to_domain(), Type::DGRAM, Some(Protocol::UDP))?;

    let bind_addr = config.bind_addr.unwrap_or_else(|| config.family.unspecified());
    socket.bind(&bind_addr.into())?;
    Ok(socket)
}
