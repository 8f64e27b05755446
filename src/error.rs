//! Error types for trace runs and packet decoding.

use crate::run::ExitStatus;
use std::io;
use thiserror::Error;

/// Errors that end a trace run.
#[derive(Error, Debug)]
pub enum TraceError {
    // Transport errors
    #[error("raw socket privilege is required: {0}")]
    Permission(#[source] io::Error),

    #[error("{0} probes are not supported on this platform")]
    UnsupportedProtocol(String),

    #[error("failed to create socket: {0}")]
    SocketCreation(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    // Configuration errors
    #[error("invalid hop range: first={first_hop}, max={max_hops}")]
    InvalidHopRange { first_hop: u8, max_hops: u8 },

    #[error("invalid number of probes per hop: {0} (expected 1..=10)")]
    InvalidProbeCount(u8),

    #[error("invalid wait time: {0:?}")]
    InvalidTimeout(std::time::Duration),

    #[error("invalid send interval: {0:?}")]
    InvalidSendInterval(std::time::Duration),

    #[error("invalid port {port}: probes would run past 65535")]
    InvalidPort { port: u16 },

    #[error("source and destination address families differ")]
    AddressFamilyMismatch,

    #[error("cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("no usable source address: {0}")]
    NoSourceAddress(String),

    #[error("{0}")]
    Arguments(String),

    #[error("trace cancelled")]
    Cancelled,
}

impl TraceError {
    /// Maps the error to the status reported at the invocation boundary.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Permission(_)
            | Self::SocketCreation(_)
            | Self::Send(_)
            | Self::Receive(_)
            | Self::NoSourceAddress(_) => ExitStatus::TransportFailure,
            Self::UnsupportedProtocol(_)
            | Self::InvalidHopRange { .. }
            | Self::InvalidProbeCount(_)
            | Self::InvalidTimeout(_)
            | Self::InvalidSendInterval(_)
            | Self::InvalidPort { .. }
            | Self::AddressFamilyMismatch
            | Self::Resolve { .. }
            | Self::Arguments(_) => ExitStatus::InvalidOptions,
            Self::Cancelled => ExitStatus::Cancelled,
        }
    }

    /// Classifies a socket creation failure.
    pub(crate) fn from_socket_creation(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => TraceError::Permission(err),
            _ => TraceError::SocketCreation(err),
        }
    }
}

/// Decode anomalies. These never end a run; the packet is dropped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("unexpected {layer} protocol {value}")]
    UnexpectedProtocol { layer: &'static str, value: u8 },

    #[error("TCP option kind {kind} has length {len}, expected {expected}")]
    OptionLength { kind: u8, len: usize, expected: usize },

    #[error("TCP option kind {kind} runs past the header")]
    OptionTruncated { kind: u8 },

    #[error("packet does not belong to this trace")]
    Mismatch,
}
