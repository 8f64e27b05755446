use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::info;

use super::{CancelToken, HopResult, HopScheduler, TraceResult};
use crate::error::TraceError;
use crate::packet::ProbeCodec;
use crate::protocol::Protocol;
use crate::socket::{SocketFamily, SocketTransport, Transport};
use crate::sys;

pub const MAX_PROBES_PER_HOP: u8 = 10;
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_SEND_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration and execution context for a traceroute.
#[derive(Clone, Debug)]
pub struct Tracer {
    /// Destination IP address.
    pub dst_ip: IpAddr,
    /// Source IP address. Inferred from the route to `dst_ip` when needed.
    pub src_ip: Option<IpAddr>,
    /// Protocol used to send probes. Default is UDP.
    pub protocol: Protocol,
    /// UDP base port or TCP destination port.
    pub port: u16,
    /// First hop limit probed. Default is `1`.
    pub first_hop: u8,
    /// Last hop limit probed. Default is `30`.
    pub max_hops: u8,
    /// Probes sent per hop. Default is `3`.
    pub probes_per_hop: u8,
    /// How long each probe waits for its response. Default is 5 seconds.
    pub probe_timeout: Duration,
    /// Delay between consecutive probes. Default is zero.
    pub send_interval: Duration,
    /// Granularity of waits; cancellation is noticed within one interval.
    pub poll_interval: Duration,
    /// Skip reverse lookups of responders.
    pub numeric: bool,
}

impl Tracer {
    /// Creates a new `Tracer` for the destination address with traceroute's
    /// defaults.
    pub fn new(dst_ip: IpAddr) -> Tracer {
        Tracer {
            dst_ip,
            src_ip: None,
            protocol: Protocol::Udp,
            port: Protocol::Udp.default_port(),
            first_hop: 1,
            max_hops: 30,
            probes_per_hop: 3,
            probe_timeout: Duration::from_secs(5),
            send_interval: Duration::ZERO,
            poll_interval: Duration::from_millis(50),
            numeric: false,
        }
    }

    /// Checks option limits. Runs before any socket is opened.
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.first_hop == 0 || self.max_hops == 0 || self.first_hop > self.max_hops {
            return Err(TraceError::InvalidHopRange {
                first_hop: self.first_hop,
                max_hops: self.max_hops,
            });
        }
        if self.probes_per_hop == 0 || self.probes_per_hop > MAX_PROBES_PER_HOP {
            return Err(TraceError::InvalidProbeCount(self.probes_per_hop));
        }
        if self.probe_timeout.is_zero() || self.probe_timeout > MAX_PROBE_TIMEOUT {
            return Err(TraceError::InvalidTimeout(self.probe_timeout));
        }
        if self.send_interval > MAX_SEND_INTERVAL {
            return Err(TraceError::InvalidSendInterval(self.send_interval));
        }
        if self.protocol == Protocol::Udp {
            // every probe of the run gets its own destination port
            let last_port =
                self.port as u32 + self.max_hops as u32 * self.probes_per_hop as u32;
            if last_port > u16::MAX as u32 {
                return Err(TraceError::InvalidPort { port: self.port });
            }
        }
        if let Some(src_ip) = self.src_ip {
            if src_ip.is_ipv4() != self.dst_ip.is_ipv4() {
                return Err(TraceError::AddressFamilyMismatch);
            }
        }
        Ok(())
    }

    /// Builds the probe codec for a run. `local_port` is the transport's
    /// source port.
    pub fn new_codec(&self, local_port: u16) -> Result<ProbeCodec, TraceError> {
        let mut codec = ProbeCodec::new(self.protocol, self.dst_ip, self.port);
        match self.protocol {
            Protocol::Tcp => {
                let src_ip = match self.src_ip {
                    Some(src_ip) => src_ip,
                    None => sys::source_ip_for(self.dst_ip)?,
                };
                codec = codec.with_src_ip(src_ip);
            }
            _ => {
                if let Some(src_ip) = self.src_ip {
                    codec = codec.with_src_ip(src_ip);
                }
            }
        }
        Ok(codec.with_src_port(local_port))
    }

    /// Opens the operating-system transport for this configuration.
    pub fn open_transport(&self) -> Result<SocketTransport, TraceError> {
        SocketTransport::open(self.get_family(), self.protocol, self.src_ip)
    }

    /// Runs traceroute synchronously over the system's sockets.
    pub fn trace(&self) -> Result<TraceResult, TraceError> {
        self.validate()?;
        let mut transport = self.open_transport()?;
        let codec = self.new_codec(transport.local_port())?;
        self.trace_with(&mut transport, &codec, &CancelToken::new(), |_| {})
    }

    /// Runs traceroute over `transport`, handing each completed hop to
    /// `on_hop` as soon as it is aggregated. The transport is closed on
    /// every exit path.
    pub fn trace_with<T, F>(
        &self,
        transport: &mut T,
        codec: &ProbeCodec,
        cancel: &CancelToken,
        on_hop: F,
    ) -> Result<TraceResult, TraceError>
    where
        T: Transport,
        F: FnMut(&HopResult),
    {
        let start_time = Instant::now();
        let result = HopScheduler::new(transport, codec, self, cancel).run(on_hop);
        transport.close();
        let (hops, status) = result?;
        let trace_time = start_time.elapsed();
        info!(?status, hops = hops.len(), ?trace_time, "trace finished");
        Ok(TraceResult {
            hops,
            status,
            trace_time,
        })
    }

    pub fn get_family(&self) -> SocketFamily {
        SocketFamily::from_ip(&self.dst_ip)
    }
    /// Sets the destination IP address.
    pub fn set_dst_ip(&mut self, dst_ip: IpAddr) {
        self.dst_ip = dst_ip;
    }
    /// Returns the destination IP address.
    pub fn get_dst_ip(&self) -> IpAddr {
        self.dst_ip
    }
    /// Sets the source IP address.
    pub fn set_src_ip(&mut self, src_ip: Option<IpAddr>) {
        self.src_ip = src_ip;
    }
    /// Returns the source IP address.
    pub fn get_src_ip(&self) -> Option<IpAddr> {
        self.src_ip
    }
    /// Sets the probe protocol and resets the port to its default.
    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
        self.port = protocol.default_port();
    }
    /// Returns the probe protocol.
    pub fn get_protocol(&self) -> Protocol {
        self.protocol
    }
    /// Sets the UDP base port or TCP destination port.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }
    /// Returns the UDP base port or TCP destination port.
    pub fn get_port(&self) -> u16 {
        self.port
    }
    /// Sets the first hop limit.
    pub fn set_first_hop(&mut self, first_hop: u8) {
        self.first_hop = first_hop;
    }
    /// Returns the first hop limit.
    pub fn get_first_hop(&self) -> u8 {
        self.first_hop
    }
    /// Sets the maximum hop limit.
    pub fn set_max_hops(&mut self, max_hops: u8) {
        self.max_hops = max_hops;
    }
    /// Returns the maximum hop limit.
    pub fn get_max_hops(&self) -> u8 {
        self.max_hops
    }
    /// Sets the number of probes per hop.
    pub fn set_probes_per_hop(&mut self, probes_per_hop: u8) {
        self.probes_per_hop = probes_per_hop;
    }
    /// Returns the number of probes per hop.
    pub fn get_probes_per_hop(&self) -> u8 {
        self.probes_per_hop
    }
    /// Sets the per-probe timeout.
    pub fn set_probe_timeout(&mut self, probe_timeout: Duration) {
        self.probe_timeout = probe_timeout;
    }
    /// Returns the per-probe timeout.
    pub fn get_probe_timeout(&self) -> Duration {
        self.probe_timeout
    }
    /// Sets the interval between probes.
    pub fn set_send_interval(&mut self, send_interval: Duration) {
        self.send_interval = send_interval;
    }
    /// Returns the interval between probes.
    pub fn get_send_interval(&self) -> Duration {
        self.send_interval
    }
    /// Sets the wait granularity.
    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }
    /// Returns the wait granularity.
    pub fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }
    /// Turns reverse lookups off or on.
    pub fn set_numeric(&mut self, numeric: bool) {
        self.numeric = numeric;
    }
    /// Returns whether reverse lookups are off.
    pub fn get_numeric(&self) -> bool {
        self.numeric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn tracer() -> Tracer {
        Tracer::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))
    }

    #[test]
    fn test_defaults_are_valid() {
        let tracer = tracer();
        assert_eq!(tracer.get_port(), 33434);
        assert_eq!(tracer.get_max_hops(), 30);
        assert_eq!(tracer.get_probes_per_hop(), 3);
        assert_eq!(tracer.get_poll_interval(), Duration::from_millis(50));
        assert!(tracer.validate().is_ok());
    }

    #[test]
    fn test_option_limits() {
        let mut t = tracer();
        t.set_first_hop(31);
        assert!(matches!(
            t.validate(),
            Err(TraceError::InvalidHopRange { first_hop: 31, max_hops: 30 })
        ));

        let mut t = tracer();
        t.set_probes_per_hop(11);
        assert!(matches!(t.validate(), Err(TraceError::InvalidProbeCount(11))));

        let mut t = tracer();
        t.set_probe_timeout(Duration::ZERO);
        assert!(matches!(t.validate(), Err(TraceError::InvalidTimeout(_))));
        t.set_probe_timeout(Duration::from_secs(61));
        assert!(matches!(t.validate(), Err(TraceError::InvalidTimeout(_))));

        let mut t = tracer();
        t.set_send_interval(Duration::from_secs(11));
        assert!(matches!(t.validate(), Err(TraceError::InvalidSendInterval(_))));

        let mut t = tracer();
        t.set_src_ip(Some("2001:db8::1".parse().unwrap()));
        assert!(matches!(t.validate(), Err(TraceError::AddressFamilyMismatch)));
    }

    #[test]
    fn test_udp_port_range() {
        let mut t = tracer();
        t.set_port(65535 - 90);
        assert!(t.validate().is_ok());
        t.set_port(65535 - 89);
        assert!(matches!(t.validate(), Err(TraceError::InvalidPort { .. })));
        // only UDP spends one port per probe
        t.set_protocol(Protocol::Tcp);
        t.set_port(65535);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_codec_uses_source() {
        let mut t = tracer();
        t.set_protocol(Protocol::Icmp);
        let codec = t.new_codec(0).unwrap();
        assert_eq!(codec.get_protocol(), Protocol::Icmp);
        assert_eq!(codec.get_dst_ip(), t.get_dst_ip());

        let mut t = tracer();
        t.set_src_ip(Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))));
        let codec = t.new_codec(40123).unwrap();
        assert_eq!(codec.get_src_port(), 40123);
    }

    #[test]
    fn test_tcp_source_follows_route() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut t = Tracer::new(loopback);
        t.set_protocol(Protocol::Tcp);
        let codec = t.new_codec(0).unwrap();
        assert_eq!(codec.get_src_ip(), Some(loopback));

        t.set_src_ip(Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))));
        let codec = t.new_codec(0).unwrap();
        assert_eq!(codec.get_src_ip(), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))));
    }
}
