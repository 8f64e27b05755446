use super::SocketFamily;
use socket2::{Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub family: SocketFamily,
    pub bind_addr: Option<SocketAddr>,
}

impl TcpConfig {
    pub fn new(family: SocketFamily) -> Self {
        Self {
            family,
            bind_addr: None,
        }
    }
}

/// Opens a raw TCP socket. Probes carry a hand-built TCP header and the kernel
/// adds the IP header; the same socket sees the destination's SYN-ACK or RST.
#[cfg(not(target_os = "windows"))]
pub fn open_tcp_socket(config: &TcpConfig) -> io::Result<Socket> {
    let socket = Socket::new(config.family.to_domain(), Type::RAW, Some(Protocol::TCP))?;

    if let Some(bind_addr) = config.bind_addr {
        socket.bind(&bind_addr.into())?;
    }
    Ok(socket)
}

/// Windows refuses to send TCP through raw sockets.
#[cfg(target_os = "windows")]
pub fn open_tcp_socket(_config: &TcpConfig) -> io::Result<Socket> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "raw TCP sockets are not available",
    ))
}
