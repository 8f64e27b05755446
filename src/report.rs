//! Streaming of per-hop result lines to the embedding application.

use std::fmt::Write;
use std::net::IpAddr;
use std::sync::mpsc::Sender;
use tracing::warn;

use crate::run::ExitStatus;
use crate::trace::HopResult;

/// Output capability supplied by the caller.
pub trait Reporter {
    /// Resets any previously shown output.
    fn clear(&mut self);
    /// Delivers one line, without a trailing newline.
    fn append(&mut self, line: &str);
    /// Called once when the run has ended.
    fn finish(&mut self, _status: ExitStatus) {}
}

impl Reporter for Vec<String> {
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn append(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Prints lines to standard output.
#[derive(Debug, Default)]
pub struct StdoutReporter;

impl StdoutReporter {
    pub fn new() -> StdoutReporter {
        StdoutReporter
    }
}

impl Reporter for StdoutReporter {
    fn clear(&mut self) {}

    fn append(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// Event sent by a [`ChannelReporter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportEvent {
    Clear,
    Line(String),
    Finished(ExitStatus),
}

/// Forwards output to another thread.
#[derive(Clone, Debug)]
pub struct ChannelReporter {
    tx: Sender<ReportEvent>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<ReportEvent>) -> ChannelReporter {
        ChannelReporter { tx }
    }

    fn send(&self, event: ReportEvent) {
        // a receiver that went away just stops listening
        let _ = self.tx.send(event);
    }
}

impl Reporter for ChannelReporter {
    fn clear(&mut self) {
        self.send(ReportEvent::Clear);
    }

    fn append(&mut self, line: &str) {
        self.send(ReportEvent::Line(line.to_string()));
    }

    fn finish(&mut self, status: ExitStatus) {
        self.send(ReportEvent::Finished(status));
    }
}

/// Formats hop results and guards the reporter's call order.
pub struct ResultReporter<'a> {
    inner: &'a mut dyn Reporter,
    numeric: bool,
    last_hop: Option<u8>,
    finished: bool,
}

impl<'a> ResultReporter<'a> {
    pub fn new(inner: &'a mut dyn Reporter) -> ResultReporter<'a> {
        ResultReporter {
            inner,
            numeric: false,
            last_hop: None,
            finished: false,
        }
    }

    pub fn set_numeric(&mut self, numeric: bool) {
        self.numeric = numeric;
    }

    pub fn begin_run(&mut self) {
        self.last_hop = None;
        self.inner.clear();
    }

    /// Delivers the line for `hop`. Hops must arrive in increasing order.
    pub fn emit(&mut self, hop: &HopResult) {
        if let Some(last_hop) = self.last_hop {
            if hop.hop <= last_hop {
                warn!(hop = hop.hop, last_hop, "hop result out of order, dropped");
                return;
            }
        }
        self.last_hop = Some(hop.hop);
        let line = format_hop(hop, self.numeric);
        self.inner.append(&line);
    }

    /// Delivers an error message, one line per line of text.
    pub fn diagnostic(&mut self, message: &str) {
        for line in message.lines().filter(|line| !line.trim().is_empty()) {
            self.inner.append(line);
        }
    }

    /// Reports the final status. Later calls are ignored.
    pub fn finish(&mut self, status: ExitStatus) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.inner.finish(status);
    }
}

/// Formats one hop in traceroute's layout:
/// ` 3  edge.example.net (10.0.0.1)  12.345 ms  11.002 ms *`.
pub fn format_hop(hop: &HopResult, numeric: bool) -> String {
    let mut line = format!("{:2} ", hop.hop);
    let mut last_addr: Option<IpAddr> = None;
    for attempt in &hop.attempts {
        let node = match attempt {
            Some(node) => node,
            None => {
                line.push_str(" *");
                continue;
            }
        };
        if last_addr != Some(node.ip_addr) {
            let ip = node.ip_addr.to_string();
            if numeric || node.host_name.is_empty() || node.host_name == ip {
                let _ = write!(line, " {}", ip);
            } else {
                let _ = write!(line, " {} ({})", node.host_name, ip);
            }
            last_addr = Some(node.ip_addr);
        }
        let _ = write!(line, "  {:.3} ms", node.rtt.as_secs_f64() * 1000.0);
        if let Some(annotation) = node.kind.annotation() {
            let _ = write!(line, " {}", annotation);
        }
    }
    line
}
