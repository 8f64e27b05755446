mod probe;
pub use probe::HopScheduler;

mod tracer;
pub use tracer::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::node::{Node, NodeType};

/// Terminal status of a completed trace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceStatus {
    /// A probe reached the destination
    Reached,
    /// `max_hops` was probed without reaching the destination
    HopLimitExhausted,
}

/// Attempts sent with one hop limit.
#[derive(Clone, Debug, PartialEq)]
pub struct HopResult {
    pub hop: u8,
    /// One entry per probe, in send order. `None` is "no response".
    pub attempts: Vec<Option<Node>>,
}

impl HopResult {
    /// Whether any attempt came back from the destination.
    pub fn reached(&self) -> bool {
        self.attempts
            .iter()
            .flatten()
            .any(|node| node.node_type == NodeType::Destination)
    }

    pub fn responded(&self) -> usize {
        self.attempts.iter().flatten().count()
    }
}

/// Result of traceroute
#[derive(Clone, Debug)]
pub struct TraceResult {
    pub hops: Vec<HopResult>,
    pub status: TraceStatus,
    pub trace_time: Duration,
}

/// Position of the hop scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ProbingHop(u8),
    AggregatingHop(u8),
    Done(TraceStatus),
}

/// Progress of one trace. Only the scheduler mutates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceState {
    pub phase: Phase,
    pub current_hop: u8,
    pub hops_attempted: u8,
    pub destination_reached: bool,
}

impl TraceState {
    fn new(first_hop: u8) -> TraceState {
        TraceState {
            phase: Phase::Idle,
            current_hop: first_hop,
            hops_attempted: 0,
            destination_reached: false,
        }
    }

    pub fn status(&self) -> Option<TraceStatus> {
        match self.phase {
            Phase::Done(status) => Some(status),
            _ => None,
        }
    }
}

/// Cooperative cancellation flag shared with a running trace.
///
/// The scheduler checks it before every send and between receive slices.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NotificationKind;
    use std::net::{IpAddr, Ipv4Addr};

    fn node(node_type: NodeType) -> Node {
        Node {
            seq: 1,
            ip_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            host_name: "10.0.0.1".to_string(),
            hop: 1,
            node_type,
            kind: NotificationKind::TimeExceeded,
            rtt: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_hop_result_reached() {
        let hop = HopResult {
            hop: 1,
            attempts: vec![Some(node(NodeType::Hop)), None, Some(node(NodeType::Hop))],
        };
        assert!(!hop.reached());
        assert_eq!(hop.responded(), 2);
        let hop = HopResult {
            hop: 1,
            attempts: vec![None, Some(node(NodeType::Destination))],
        };
        assert!(hop.reached());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
