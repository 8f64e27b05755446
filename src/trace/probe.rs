use std::mem;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use super::{CancelToken, HopResult, Phase, TraceState, TraceStatus, Tracer};
use crate::error::TraceError;
use crate::lookup::Resolver;
use crate::node::{Node, NodeType};
use crate::packet::{Decoded, ProbeCodec, Response};
use crate::socket::Transport;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A probe waiting for its response.
struct Pending {
    token: u16,
    attempt: usize,
    sent_at: Instant,
    deadline: Instant,
}

/// Drives one trace hop by hop: `Idle`, then `ProbingHop(h)` and
/// `AggregatingHop(h)` for each hop, then `Done`.
pub struct HopScheduler<'a, T: Transport> {
    transport: &'a mut T,
    codec: &'a ProbeCodec,
    tracer: &'a Tracer,
    cancel: &'a CancelToken,
    resolver: Resolver,
    state: TraceState,
    attempts: Vec<Option<Node>>,
    last_token: u16,
}

impl<'a, T: Transport> HopScheduler<'a, T> {
    pub fn new(
        transport: &'a mut T,
        codec: &'a ProbeCodec,
        tracer: &'a Tracer,
        cancel: &'a CancelToken,
    ) -> HopScheduler<'a, T> {
        HopScheduler {
            transport,
            codec,
            tracer,
            cancel,
            resolver: Resolver::new(tracer.numeric),
            state: TraceState::new(tracer.first_hop),
            attempts: Vec::new(),
            last_token: 0,
        }
    }

    /// Replaces the reverse lookup used for responder names.
    pub fn with_resolver(mut self, resolver: Resolver) -> HopScheduler<'a, T> {
        self.resolver = resolver;
        self
    }

    pub fn state(&self) -> &TraceState {
        &self.state
    }

    /// Runs to completion, handing every hop to `on_hop` as soon as it is
    /// aggregated.
    pub fn run<F>(mut self, mut on_hop: F) -> Result<(Vec<HopResult>, TraceStatus), TraceError>
    where
        F: FnMut(&HopResult),
    {
        let mut hops = Vec::new();
        loop {
            if let Some(status) = self.state.status() {
                return Ok((hops, status));
            }
            if let Some(hop) = self.step()? {
                on_hop(&hop);
                hops.push(hop);
            }
        }
    }

    /// Advances the state machine by one transition. Returns the hop result
    /// when the transition aggregated one.
    pub fn step(&mut self) -> Result<Option<HopResult>, TraceError> {
        match self.state.phase {
            Phase::Idle => {
                self.state.current_hop = self.tracer.first_hop;
                self.state.phase = Phase::ProbingHop(self.tracer.first_hop);
                Ok(None)
            }
            Phase::ProbingHop(hop) => {
                self.attempts = self.probe_hop(hop)?;
                self.state.phase = Phase::AggregatingHop(hop);
                Ok(None)
            }
            Phase::AggregatingHop(hop) => {
                let mut attempts = mem::take(&mut self.attempts);
                for node in attempts.iter_mut().flatten() {
                    node.host_name = self.resolver.host_name(node.ip_addr);
                }
                let result = HopResult { hop, attempts };
                self.state.hops_attempted += 1;
                self.state.destination_reached = result.reached();
                self.state.phase = if self.state.destination_reached {
                    Phase::Done(TraceStatus::Reached)
                } else if hop >= self.tracer.max_hops {
                    Phase::Done(TraceStatus::HopLimitExhausted)
                } else {
                    self.state.current_hop = hop + 1;
                    Phase::ProbingHop(hop + 1)
                };
                debug!(hop, responded = result.responded(), phase = ?self.state.phase, "hop aggregated");
                Ok(Some(result))
            }
            Phase::Done(_) => Ok(None),
        }
    }

    fn probe_hop(&mut self, hop: u8) -> Result<Vec<Option<Node>>, TraceError> {
        self.transport.set_hop_limit(hop)?;
        let count = self.tracer.probes_per_hop as usize;
        let mut attempts: Vec<Option<Node>> = vec![None; count];
        let mut pending: Vec<Pending> = Vec::with_capacity(count);
        let mut last_deadline = Instant::now();
        for attempt in 0..count {
            self.check_cancelled()?;
            let token = self.next_token();
            let probe = self.codec.encode(hop, token);
            let sent_at = self.transport.send(&probe, self.codec.get_dst_ip())?;
            trace!(hop, token, "probe sent");
            last_deadline = sent_at + self.tracer.probe_timeout;
            pending.push(Pending {
                token,
                attempt,
                sent_at,
                deadline: last_deadline,
            });
            if attempt + 1 < count && !self.tracer.send_interval.is_zero() {
                let until = Instant::now() + self.tracer.send_interval;
                self.collect(hop, &mut pending, &mut attempts, until, false)?;
            }
        }
        self.collect(hop, &mut pending, &mut attempts, last_deadline, true)?;
        Ok(attempts)
    }

    /// Receives until `until`, or until nothing is pending when
    /// `stop_when_resolved` is set.
    fn collect(
        &mut self,
        hop: u8,
        pending: &mut Vec<Pending>,
        attempts: &mut [Option<Node>],
        until: Instant,
        stop_when_resolved: bool,
    ) -> Result<(), TraceError> {
        let poll_interval = self.tracer.poll_interval.max(MIN_POLL_INTERVAL);
        loop {
            let now = Instant::now();
            pending.retain(|probe| probe.deadline > now);
            if now >= until || (stop_when_resolved && pending.is_empty()) {
                return Ok(());
            }
            self.check_cancelled()?;
            let wait = (until - now).min(poll_interval);
            if let Some(received) = self.transport.receive(wait)? {
                if let Decoded::Response(response) = self.codec.decode(&received) {
                    self.accept(hop, response, pending, attempts);
                }
            }
        }
    }

    fn accept(
        &mut self,
        hop: u8,
        response: Response,
        pending: &mut Vec<Pending>,
        attempts: &mut [Option<Node>],
    ) {
        let index = match pending.iter().position(|probe| probe.token == response.token) {
            Some(index) => index,
            None => {
                trace!(token = response.token, from = %response.source, "no pending probe for token");
                return;
            }
        };
        if response.received_at > pending[index].deadline {
            trace!(token = response.token, "late response");
            return;
        }
        let probe = pending.swap_remove(index);
        let node_type = if response.is_from_destination(self.codec.get_dst_ip()) {
            NodeType::Destination
        } else {
            NodeType::Hop
        };
        attempts[probe.attempt] = Some(Node {
            seq: response.token,
            ip_addr: response.source,
            // named once the hop is aggregated
            host_name: String::new(),
            hop,
            node_type,
            kind: response.kind,
            rtt: response.received_at.saturating_duration_since(probe.sent_at),
        });
    }

    fn next_token(&mut self) -> u16 {
        self.last_token = self.last_token.wrapping_add(1);
        self.last_token
    }

    fn check_cancelled(&self) -> Result<(), TraceError> {
        if self.cancel.is_cancelled() {
            info!(hop = self.state.current_hop, "trace cancelled");
            return Err(TraceError::Cancelled);
        }
        Ok(())
    }
}
