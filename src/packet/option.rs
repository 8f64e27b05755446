//! TCP header options.
//!
//! Only the kinds a SYN probe or its answer carries are decoded; other kinds
//! are kept as raw bytes as long as their length field is consistent.

use crate::error::PacketError;

pub const TCPOPT_EOL: u8 = 0;
pub const TCPOPT_NOP: u8 = 1;
pub const TCPOPT_MAXSEG: u8 = 2;
pub const TCPOLEN_MAXSEG: usize = 4;
pub const TCPOPT_WINDOW: u8 = 3;
pub const TCPOLEN_WINDOW: usize = 3;
pub const TCPOPT_SACK_PERMITTED: u8 = 4;
pub const TCPOLEN_SACK_PERMITTED: usize = 2;
pub const TCPOPT_SACK: u8 = 5;
pub const TCPOPT_TIMESTAMP: u8 = 8;
pub const TCPOLEN_TIMESTAMP: usize = 10;

/// A single TCP option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TcpOption {
    EndOfList,
    Nop,
    MaxSegmentSize(u16),
    WindowScale(u8),
    SackPermitted,
    /// Left/right edges of each SACK block.
    Sack(Vec<(u32, u32)>),
    Timestamp { value: u32, echo: u32 },
    Unknown { kind: u8, data: Vec<u8> },
}

impl TcpOption {
    pub fn kind(&self) -> u8 {
        match self {
            TcpOption::EndOfList => TCPOPT_EOL,
            TcpOption::Nop => TCPOPT_NOP,
            TcpOption::MaxSegmentSize(_) => TCPOPT_MAXSEG,
            TcpOption::WindowScale(_) => TCPOPT_WINDOW,
            TcpOption::SackPermitted => TCPOPT_SACK_PERMITTED,
            TcpOption::Sack(_) => TCPOPT_SACK,
            TcpOption::Timestamp { .. } => TCPOPT_TIMESTAMP,
            TcpOption::Unknown { kind, .. } => *kind,
        }
    }

    /// Number of bytes the option occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self {
            TcpOption::EndOfList | TcpOption::Nop => 1,
            TcpOption::MaxSegmentSize(_) => TCPOLEN_MAXSEG,
            TcpOption::WindowScale(_) => TCPOLEN_WINDOW,
            TcpOption::SackPermitted => TCPOLEN_SACK_PERMITTED,
            TcpOption::Sack(blocks) => 2 + blocks.len() * 8,
            TcpOption::Timestamp { .. } => TCPOLEN_TIMESTAMP,
            TcpOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.kind());
        if matches!(self, TcpOption::EndOfList | TcpOption::Nop) {
            return;
        }
        out.push(self.encoded_len() as u8);
        match self {
            TcpOption::MaxSegmentSize(mss) => out.extend_from_slice(&mss.to_be_bytes()),
            TcpOption::WindowScale(shift) => out.push(*shift),
            TcpOption::Sack(blocks) => {
                for (left, right) in blocks {
                    out.extend_from_slice(&left.to_be_bytes());
                    out.extend_from_slice(&right.to_be_bytes());
                }
            }
            TcpOption::Timestamp { value, echo } => {
                out.extend_from_slice(&value.to_be_bytes());
                out.extend_from_slice(&echo.to_be_bytes());
            }
            TcpOption::Unknown { data, .. } => out.extend_from_slice(data),
            _ => {}
        }
    }
}

/// Serializes options, padding with end-of-list to a 32-bit boundary.
pub fn encode_options(options: &[TcpOption]) -> Vec<u8> {
    let mut out = Vec::with_capacity(40);
    for option in options {
        option.write(&mut out);
    }
    while out.len() % 4 != 0 {
        out.push(TCPOPT_EOL);
    }
    out
}

fn expect_len(kind: u8, len: usize, expected: usize) -> Result<(), PacketError> {
    if len == expected {
        Ok(())
    } else {
        Err(PacketError::OptionLength {
            kind,
            len,
            expected,
        })
    }
}

/// Parses the options area of a TCP header.
///
/// A length byte that disagrees with the option kind, or that runs past the
/// end of `bytes`, is an error.
pub fn parse_options(bytes: &[u8]) -> Result<Vec<TcpOption>, PacketError> {
    let mut options = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let kind = bytes[i];
        match kind {
            TCPOPT_EOL => {
                options.push(TcpOption::EndOfList);
                break;
            }
            TCPOPT_NOP => {
                options.push(TcpOption::Nop);
                i += 1;
                continue;
            }
            _ => {}
        }
        if i + 1 >= bytes.len() {
            return Err(PacketError::OptionTruncated { kind });
        }
        let len = bytes[i + 1] as usize;
        if len < 2 {
            return Err(PacketError::OptionLength {
                kind,
                len,
                expected: 2,
            });
        }
        if i + len > bytes.len() {
            return Err(PacketError::OptionTruncated { kind });
        }
        let data = &bytes[i + 2..i + len];
        let option = match kind {
            TCPOPT_MAXSEG => {
                expect_len(kind, len, TCPOLEN_MAXSEG)?;
                TcpOption::MaxSegmentSize(u16::from_be_bytes([data[0], data[1]]))
            }
            TCPOPT_WINDOW => {
                expect_len(kind, len, TCPOLEN_WINDOW)?;
                TcpOption::WindowScale(data[0])
            }
            TCPOPT_SACK_PERMITTED => {
                expect_len(kind, len, TCPOLEN_SACK_PERMITTED)?;
                TcpOption::SackPermitted
            }
            TCPOPT_SACK => {
                if data.is_empty() || data.len() % 8 != 0 {
                    return Err(PacketError::OptionLength {
                        kind,
                        len,
                        expected: 2 + 8 * (data.len() / 8).max(1),
                    });
                }
                let blocks = data
                    .chunks_exact(8)
                    .map(|b| {
                        (
                            u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
                            u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
                        )
                    })
                    .collect();
                TcpOption::Sack(blocks)
            }
            TCPOPT_TIMESTAMP => {
                expect_len(kind, len, TCPOLEN_TIMESTAMP)?;
                TcpOption::Timestamp {
                    value: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
                    echo: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                }
            }
            _ => TcpOption::Unknown {
                kind,
                data: data.to_vec(),
            },
        };
        options.push(option);
        i += len;
    }
    Ok(options)
}
