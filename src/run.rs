//! Single entry point: argv in, result lines and a status code out.

use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

use crate::cli::Args;
use crate::error::TraceError;
use crate::packet::ProbeCodec;
use crate::report::{Reporter, ResultReporter};
use crate::socket::Transport;
use crate::trace::{CancelToken, TraceStatus, Tracer};

/// Outcome of a run, as reported to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// The destination answered.
    Reached,
    /// `max_hops` probed without reaching the destination.
    HopLimitExhausted,
    InvalidOptions,
    TransportFailure,
    /// The run ended without producing a status (a panic inside the engine).
    NeverCompleted,
    Cancelled,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Reached => 0,
            ExitStatus::HopLimitExhausted => 1,
            ExitStatus::InvalidOptions => -1,
            ExitStatus::TransportFailure => -2,
            ExitStatus::NeverCompleted => -3,
            ExitStatus::Cancelled => -4,
        }
    }
}

impl From<TraceStatus> for ExitStatus {
    fn from(status: TraceStatus) -> Self {
        match status {
            TraceStatus::Reached => ExitStatus::Reached,
            TraceStatus::HopLimitExhausted => ExitStatus::HopLimitExhausted,
        }
    }
}

/// Everything one run owns. Created at entry and dropped at exit.
pub struct RunContext<T: Transport> {
    pub tracer: Tracer,
    pub codec: ProbeCodec,
    pub transport: T,
    pub cancel: CancelToken,
}

impl<T: Transport> RunContext<T> {
    /// Drives the trace, streaming each hop to `out`. The transport is closed
    /// before this returns.
    pub fn execute(&mut self, out: &mut ResultReporter<'_>) -> Result<TraceStatus, TraceError> {
        let result = self.tracer.trace_with(
            &mut self.transport,
            &self.codec,
            &self.cancel,
            |hop| out.emit(hop),
        )?;
        Ok(result.status)
    }
}

/// Runs one traceroute described by `argv` (program name first) and returns
/// the status code. Blocks until the trace ends.
pub fn run<I, S>(argv: I, reporter: &mut dyn Reporter) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    run_with_cancel(argv, reporter, &CancelToken::new())
}

/// Like [`run`], stopping early once `cancel` is set.
pub fn run_with_cancel<I, S>(argv: I, reporter: &mut dyn Reporter, cancel: &CancelToken) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    run_with(argv, reporter, cancel, Tracer::open_transport)
}

/// Lifecycle shared by every entry point; `open` supplies the transport once
/// the options are known to be valid.
pub(crate) fn run_with<I, S, T, O>(
    argv: I,
    reporter: &mut dyn Reporter,
    cancel: &CancelToken,
    open: O,
) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    T: Transport,
    O: FnOnce(&Tracer) -> Result<T, TraceError>,
{
    let mut out = ResultReporter::new(reporter);
    out.begin_run();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(argv, &mut out, cancel, open)
    }));
    let status = match outcome {
        Ok(Ok(status)) => ExitStatus::from(status),
        Ok(Err(e)) => {
            warn!(error = %e, "trace failed");
            out.diagnostic(&e.to_string());
            e.exit_status()
        }
        Err(_) => {
            warn!("trace never completed");
            out.diagnostic("traceroute: run aborted before completion");
            ExitStatus::NeverCompleted
        }
    };
    out.finish(status);
    status.code()
}

fn execute<I, S, T, O>(
    argv: I,
    out: &mut ResultReporter<'_>,
    cancel: &CancelToken,
    open: O,
) -> Result<TraceStatus, TraceError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    T: Transport,
    O: FnOnce(&Tracer) -> Result<T, TraceError>,
{
    let args = Args::parse_argv(argv)?;
    let tracer = args.to_tracer()?;
    tracer.validate()?;
    out.set_numeric(tracer.numeric);

    let transport = open(&tracer)?;
    let codec = tracer.new_codec(transport.local_port())?;
    info!(
        "traceroute to {} ({}), {} hops max, {} byte packets",
        args.host,
        tracer.dst_ip,
        tracer.max_hops,
        codec.wire_len()
    );
    let mut context = RunContext {
        tracer,
        codec,
        transport,
        cancel: cancel.clone(),
    };
    context.execute(out)
}
