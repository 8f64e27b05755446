use socket2::{Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use crate::error::TraceError;
use crate::socket::SocketFamily;

// any port works; connecting a datagram socket sends nothing
const DISCARD_PORT: u16 = 9;

/// Source address for probes to `dst_ip`.
///
/// Asks the kernel which address its route to `dst_ip` uses, so raw TCP
/// checksums match the address the packet actually leaves with. Falls back
/// to the default interface when the route cannot be queried.
pub(crate) fn source_ip_for(dst_ip: IpAddr) -> Result<IpAddr, TraceError> {
    match route_source_ip(dst_ip) {
        Ok(src_ip) if !src_ip.is_unspecified() => Ok(src_ip),
        Ok(_) => default_source_ip(SocketFamily::from_ip(&dst_ip)),
        Err(e) => {
            debug!(%dst_ip, error = %e, "route lookup failed, using default interface");
            default_source_ip(SocketFamily::from_ip(&dst_ip))
        }
    }
}

fn route_source_ip(dst_ip: IpAddr) -> io::Result<IpAddr> {
    let family = SocketFamily::from_ip(&dst_ip);
    let socket = Socket::new(family.to_domain(), Type::DGRAM, Some(Protocol::UDP))?;
    socket.connect(&SocketAddr::new(dst_ip, DISCARD_PORT).into())?;
    socket
        .local_addr()?
        .as_socket()
        .map(|addr| addr.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "local address is not an IP address"))
}

/// Source address of the default interface for `family`.
///
/// Raw TCP probes need it for the pseudo-header checksum.
pub(crate) fn default_source_ip(family: SocketFamily) -> Result<IpAddr, TraceError> {
    let interface = default_net::get_default_interface().map_err(TraceError::NoSourceAddress)?;
    let src_ip = match family {
        SocketFamily::Ipv4 => interface.ipv4.first().map(|net| IpAddr::V4(net.addr)),
        SocketFamily::Ipv6 => interface
            .ipv6
            .iter()
            .map(|net| net.addr)
            .find(|addr| !is_unicast_link_local(addr))
            .map(IpAddr::V6),
    };
    src_ip.ok_or_else(|| {
        TraceError::NoSourceAddress(format!(
            "interface {} has no {:?} address",
            interface.name, family
        ))
    })
}

fn is_unicast_link_local(addr: &std::net::Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_route_source() {
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(route_source_ip(loopback).unwrap(), loopback);
        assert_eq!(source_ip_for(loopback).unwrap(), loopback);
    }

    #[test]
    fn test_link_local() {
        assert!(is_unicast_link_local(&"fe80::1".parse().unwrap()));
        assert!(!is_unicast_link_local(&"2001:db8::1".parse().unwrap()));
    }
}
