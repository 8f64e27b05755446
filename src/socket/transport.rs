use socket2::{SockAddr, Socket};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tracing::debug;

use super::icmp::{open_icmp_socket, IcmpConfig};
use super::tcp::{open_tcp_socket, TcpConfig};
use super::udp::{open_udp_socket, UdpConfig};
use super::{Channel, Received, SocketFamily, Transport};
use crate::error::TraceError;
use crate::packet::ProbePacket;
use crate::protocol::Protocol;

const RECV_BUF_LEN: usize = 1500;
/// How long each receive socket is polled when several are open.
const RECV_SLICE: Duration = Duration::from_millis(5);
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

struct Endpoint {
    socket: Socket,
    /// `None` for send-only sockets.
    channel: Option<Channel>,
}

/// Operating-system sockets for one run.
///
/// The first endpoint is the one probes are sent from.
pub struct SocketTransport {
    family: SocketFamily,
    endpoints: Vec<Endpoint>,
    local_port: u16,
}

impl SocketTransport {
    /// Opens the sockets for `protocol`. `bind_ip` pins the source address.
    pub fn open(
        family: SocketFamily,
        protocol: Protocol,
        bind_ip: Option<IpAddr>,
    ) -> Result<SocketTransport, TraceError> {
        let bind_addr = bind_ip.map(|ip| SocketAddr::new(ip, 0));
        let icmp_config = IcmpConfig {
            bind_addr,
            ..IcmpConfig::new(family)
        };
        let mut endpoints = Vec::with_capacity(2);
        match protocol {
            Protocol::Udp => {
                let udp_config = UdpConfig {
                    bind_addr,
                    ..UdpConfig::new(family)
                };
                endpoints.push(Endpoint {
                    socket: open_udp_socket(&udp_config).map_err(TraceError::from_socket_creation)?,
                    channel: None,
                });
                endpoints.push(Endpoint {
                    socket: open_icmp_socket(&icmp_config)
                        .map_err(TraceError::from_socket_creation)?,
                    channel: Some(Channel::Icmp),
                });
            }
            Protocol::Icmp => {
                endpoints.push(Endpoint {
                    socket: open_icmp_socket(&icmp_config)
                        .map_err(TraceError::from_socket_creation)?,
                    channel: Some(Channel::Icmp),
                });
            }
            Protocol::Tcp => {
                let tcp_config = TcpConfig {
                    bind_addr,
                    ..TcpConfig::new(family)
                };
                let socket = open_tcp_socket(&tcp_config).map_err(|e| match e.kind() {
                    io::ErrorKind::Unsupported => {
                        TraceError::UnsupportedProtocol(protocol.to_string())
                    }
                    _ => TraceError::from_socket_creation(e),
                })?;
                endpoints.push(Endpoint {
                    socket,
                    channel: Some(Channel::Tcp),
                });
                endpoints.push(Endpoint {
                    socket: open_icmp_socket(&icmp_config)
                        .map_err(TraceError::from_socket_creation)?,
                    channel: Some(Channel::Icmp),
                });
            }
        }
        let local_port = match protocol {
            Protocol::Udp => endpoints[0]
                .socket
                .local_addr()
                .ok()
                .and_then(|addr| addr.as_socket())
                .map(|addr| addr.port())
                .unwrap_or(0),
            _ => 0,
        };
        debug!(?family, %protocol, sockets = endpoints.len(), local_port, "transport opened");
        Ok(SocketTransport {
            family,
            endpoints,
            local_port,
        })
    }

    fn send_socket(&self) -> Result<&Socket, TraceError> {
        self.endpoints
            .first()
            .map(|endpoint| &endpoint.socket)
            .ok_or_else(|| TraceError::Send(io::Error::from(io::ErrorKind::NotConnected)))
    }

    fn receive_from(
        &self,
        socket: &Socket,
        channel: Channel,
        timeout: Duration,
    ) -> Result<Option<Received>, TraceError> {
        socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .map_err(TraceError::Receive)?;
        let mut buf = [MaybeUninit::<u8>::uninit(); RECV_BUF_LEN];
        match socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                let at = Instant::now();
                // recv_from initialised the first `len` bytes
                let bytes =
                    unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) }.to_vec();
                Ok(Some(Received {
                    bytes,
                    from: source_ip(&addr, self.family),
                    at,
                    channel,
                }))
            }
            Err(e) => match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
                    Ok(None)
                }
                _ => Err(TraceError::Receive(e)),
            },
        }
    }
}

fn source_ip(addr: &SockAddr, family: SocketFamily) -> IpAddr {
    addr.as_socket()
        .map(|addr| addr.ip())
        .unwrap_or_else(|| family.unspecified().ip())
}

impl Transport for SocketTransport {
    fn set_hop_limit(&mut self, hop_limit: u8) -> Result<(), TraceError> {
        let socket = self.send_socket()?;
        super::set_hop_limit(socket, self.family, hop_limit).map_err(TraceError::Send)
    }

    fn send(&mut self, probe: &ProbePacket, dst_ip: IpAddr) -> Result<Instant, TraceError> {
        let socket = self.send_socket()?;
        // raw sockets ignore the port
        let target = SockAddr::from(SocketAddr::new(dst_ip, probe.dst_port));
        socket
            .send_to(&probe.bytes, &target)
            .map_err(TraceError::Send)?;
        Ok(Instant::now())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Received>, TraceError> {
        let receivers: Vec<(&Socket, Channel)> = self
            .endpoints
            .iter()
            .filter_map(|endpoint| endpoint.channel.map(|channel| (&endpoint.socket, channel)))
            .collect();
        if receivers.is_empty() || timeout.is_zero() {
            return Ok(None);
        }
        if let [(socket, channel)] = receivers.as_slice() {
            return self.receive_from(socket, *channel, timeout);
        }
        let deadline = Instant::now() + timeout;
        loop {
            for (socket, channel) in &receivers {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                if let Some(received) = self.receive_from(socket, *channel, remaining.min(RECV_SLICE))? {
                    return Ok(Some(received));
                }
            }
        }
    }

    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn close(&mut self) {
        if !self.endpoints.is_empty() {
            debug!(sockets = self.endpoints.len(), "transport closed");
            self.endpoints.clear();
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}
