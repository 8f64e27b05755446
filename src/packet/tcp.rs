use pnet_packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket};
use std::net::IpAddr;

use super::option::{encode_options, parse_options, TcpOption};
use crate::error::PacketError;

pub const TCP_HEADER_LEN: usize = 20;
const TCP_WINDOW_SIZE: u16 = 64240;
const TCP_FLAG_RST: u8 = 0x04;
const TCP_FLAG_SYN: u8 = 0x02;
const TCP_FLAG_ACK: u8 = 0x10;

/// Options of a SYN as a Linux host would send it.
pub fn syn_options(timestamp: u32) -> Vec<TcpOption> {
    vec![
        TcpOption::MaxSegmentSize(1460),
        TcpOption::SackPermitted,
        TcpOption::Timestamp {
            value: timestamp,
            echo: 0,
        },
        TcpOption::Nop,
        TcpOption::WindowScale(7),
    ]
}

/// Builds a TCP SYN header with options. The IP header is left to the kernel.
pub fn build_tcp_syn(
    src_ip: IpAddr,
    dst_ip: IpAddr,
    src_port: u16,
    dst_port: u16,
    sequence: u32,
    options: &[TcpOption],
) -> Vec<u8> {
    let options = encode_options(options);
    let header_len = TCP_HEADER_LEN + options.len();
    let mut buf = vec![0u8; header_len];
    buf[TCP_HEADER_LEN..].copy_from_slice(&options);
    if let Some(mut tcp_packet) = MutableTcpPacket::new(&mut buf) {
        tcp_packet.set_source(src_port);
        tcp_packet.set_destination(dst_port);
        tcp_packet.set_sequence(sequence);
        tcp_packet.set_acknowledgement(0);
        tcp_packet.set_data_offset((header_len / 4) as u8);
        tcp_packet.set_flags(TcpFlags::SYN);
        tcp_packet.set_window(TCP_WINDOW_SIZE);
        tcp_packet.set_urgent_ptr(0);
        let checksum = match (src_ip, dst_ip) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                pnet_packet::tcp::ipv4_checksum(&tcp_packet.to_immutable(), &src, &dst)
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                pnet_packet::tcp::ipv6_checksum(&tcp_packet.to_immutable(), &src, &dst)
            }
            _ => 0,
        };
        tcp_packet.set_checksum(checksum);
    }
    buf
}

/// The part of a TCP header that identifies a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedTcp {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
}

/// Parses a TCP header quoted inside an ICMP error.
///
/// Routers are only required to return 8 bytes; when the whole header is
/// present its options are validated as well.
pub fn parse_quoted(bytes: &[u8]) -> Result<QuotedTcp, PacketError> {
    if bytes.len() < 8 {
        return Err(PacketError::TooShort {
            expected: 8,
            actual: bytes.len(),
        });
    }
    if bytes.len() >= TCP_HEADER_LEN {
        let header_len = data_offset(bytes)?;
        if bytes.len() >= header_len {
            parse_options(&bytes[TCP_HEADER_LEN..header_len])?;
        }
    }
    Ok(QuotedTcp {
        src_port: u16::from_be_bytes([bytes[0], bytes[1]]),
        dst_port: u16::from_be_bytes([bytes[2], bytes[3]]),
        sequence: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    })
}

/// A TCP segment received directly from the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub flags: u8,
    pub options: Vec<TcpOption>,
}

impl TcpSegment {
    pub fn is_syn_ack(&self) -> bool {
        self.flags & (TCP_FLAG_SYN | TCP_FLAG_ACK) == TCP_FLAG_SYN | TCP_FLAG_ACK
    }

    pub fn is_rst(&self) -> bool {
        self.flags & TCP_FLAG_RST != 0
    }
}

pub fn parse_segment(bytes: &[u8]) -> Result<TcpSegment, PacketError> {
    let tcp = TcpPacket::new(bytes).ok_or(PacketError::TooShort {
        expected: TCP_HEADER_LEN,
        actual: bytes.len(),
    })?;
    let header_len = data_offset(bytes)?;
    if bytes.len() < header_len {
        return Err(PacketError::TooShort {
            expected: header_len,
            actual: bytes.len(),
        });
    }
    Ok(TcpSegment {
        src_port: tcp.get_source(),
        dst_port: tcp.get_destination(),
        sequence: tcp.get_sequence(),
        acknowledgement: tcp.get_acknowledgement(),
        flags: bytes[13],
        options: parse_options(&bytes[TCP_HEADER_LEN..header_len])?,
    })
}

fn data_offset(bytes: &[u8]) -> Result<usize, PacketError> {
    let header_len = (bytes[12] >> 4) as usize * 4;
    if header_len < TCP_HEADER_LEN {
        return Err(PacketError::UnexpectedProtocol {
            layer: "TCP data offset",
            value: bytes[12] >> 4,
        });
    }
    Ok(header_len)
}

/// A reply from the destination, as a test peer would send it.
#[cfg(test)]
pub(crate) fn build_tcp_reply(
    src_port: u16,
    dst_port: u16,
    acknowledgement: u32,
    flags: u8,
    options: &[TcpOption],
) -> Vec<u8> {
    let options = encode_options(options);
    let header_len = TCP_HEADER_LEN + options.len();
    let mut buf = vec![0u8; header_len];
    buf[0..2].copy_from_slice(&src_port.to_be_bytes());
    buf[2..4].copy_from_slice(&dst_port.to_be_bytes());
    buf[4..8].copy_from_slice(&rand::random::<u32>().to_be_bytes());
    buf[8..12].copy_from_slice(&acknowledgement.to_be_bytes());
    buf[12] = ((header_len / 4) as u8) << 4;
    buf[13] = flags;
    buf[14..16].copy_from_slice(&TCP_WINDOW_SIZE.to_be_bytes());
    buf[TCP_HEADER_LEN..].copy_from_slice(&options);
    buf
}
