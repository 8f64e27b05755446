//! Traceroute engine with UDP, ICMP and TCP probes over IPv4 and IPv6.
//!
//! [`run`] takes traceroute-style arguments, streams one line per hop to a
//! [`Reporter`] and returns a status code. [`Tracer`] is the programmatic
//! entry point.

pub mod cli;
pub mod error;
pub mod lookup;
pub mod node;
pub mod packet;
pub mod protocol;
pub mod report;
pub mod run;
pub mod socket;
mod sys;
pub mod trace;

#[cfg(test)]
mod testing;

pub use error::{PacketError, TraceError};
pub use report::{ChannelReporter, ReportEvent, Reporter, ResultReporter, StdoutReporter};
pub use run::{run, run_with_cancel, ExitStatus};
pub use trace::{CancelToken, HopResult, TraceResult, TraceStatus, Tracer};
