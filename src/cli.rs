use clap::Parser;
use std::ffi::OsString;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::TraceError;
use crate::lookup;
use crate::protocol::Protocol;
use crate::socket::SocketFamily;
use crate::trace::Tracer;

/// Print the route packets take to a network host
#[derive(Parser, Debug, Clone)]
#[command(name = "hoptrace")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Destination host name or IP address
    pub host: String,

    /// Use ICMP echo requests
    #[arg(short = 'I', long = "icmp", group = "method")]
    pub icmp: bool,

    /// Use TCP SYN probes
    #[arg(short = 'T', long = "tcp", group = "method")]
    pub tcp: bool,

    /// Use UDP datagrams (default)
    #[arg(short = 'U', long = "udp", group = "method")]
    pub udp: bool,

    /// Probe protocol by name (udp, icmp, tcp)
    #[arg(short = 'P', long = "protocol", group = "method")]
    pub protocol: Option<String>,

    /// Use IPv4
    #[arg(short = '4', conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Use IPv6
    #[arg(short = '6')]
    pub ipv6: bool,

    /// Hop limit to start from
    #[arg(short = 'f', long = "first", default_value = "1")]
    pub first_hop: u8,

    /// Maximum number of hops
    #[arg(short = 'm', long = "max-hops", default_value = "30")]
    pub max_hops: u8,

    /// Probes per hop
    #[arg(short = 'q', long = "queries", default_value = "3")]
    pub queries: u8,

    /// Seconds to wait for each response
    #[arg(short = 'w', long = "wait", default_value = "5.0")]
    pub wait: f64,

    /// Seconds between probes
    #[arg(short = 'z', long = "sendwait", default_value = "0")]
    pub send_wait: f64,

    /// UDP base port or TCP destination port
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Source address
    #[arg(short = 's', long = "source")]
    pub source: Option<IpAddr>,

    /// Print addresses numerically
    #[arg(short = 'n')]
    pub numeric: bool,

    /// Verbose diagnostics on stderr
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// Parses a full argv, program name first. Help and version requests are
    /// reported as errors carrying their text.
    pub fn parse_argv<I, S>(argv: I) -> Result<Args, TraceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        Args::try_parse_from(argv).map_err(|e| TraceError::Arguments(e.render().to_string()))
    }

    pub fn get_protocol(&self) -> Result<Protocol, TraceError> {
        if self.icmp {
            Ok(Protocol::Icmp)
        } else if self.tcp {
            Ok(Protocol::Tcp)
        } else if let Some(name) = &self.protocol {
            name.parse()
        } else {
            Ok(Protocol::Udp)
        }
    }

    pub fn get_family(&self) -> Option<SocketFamily> {
        if self.ipv4 {
            Some(SocketFamily::Ipv4)
        } else if self.ipv6 {
            Some(SocketFamily::Ipv6)
        } else {
            self.source.as_ref().map(SocketFamily::from_ip)
        }
    }

    /// Resolves the destination and builds the trace options.
    pub fn to_tracer(&self) -> Result<Tracer, TraceError> {
        let protocol = self.get_protocol()?;
        let probe_timeout = seconds(self.wait, "wait time")?;
        let send_interval = seconds(self.send_wait, "send interval")?;
        let dst_ip = lookup::resolve_host(&self.host, self.get_family())?;

        let mut tracer = Tracer::new(dst_ip);
        tracer.set_protocol(protocol);
        if let Some(port) = self.port {
            tracer.set_port(port);
        }
        tracer.set_src_ip(self.source);
        tracer.set_first_hop(self.first_hop);
        tracer.set_max_hops(self.max_hops);
        tracer.set_probes_per_hop(self.queries);
        tracer.set_probe_timeout(probe_timeout);
        tracer.set_send_interval(send_interval);
        tracer.set_numeric(self.numeric);
        Ok(tracer)
    }
}

fn seconds(value: f64, what: &str) -> Result<Duration, TraceError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| TraceError::Arguments(format!("invalid {}: {}", what, value)))
}
