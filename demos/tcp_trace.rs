use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use hoptrace::protocol::Protocol;
use hoptrace::report::format_hop;
use hoptrace::Tracer;

fn main() {
    // TCP traceroute to port 443 of cloudflare's one.one.one.one (1.1.1.1)
    let dst_ip: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));
    let mut tracer = Tracer::new(dst_ip);
    tracer.set_protocol(Protocol::Tcp);
    tracer.set_port(443);
    tracer.set_probe_timeout(Duration::from_secs(2));
    match tracer.trace() {
        Ok(r) => {
            println!("Status: {:?}", r.status);
            for hop in r.hops {
                println!("{}", format_hop(&hop, false));
            }
            println!("Trace Time: {:?}", r.trace_time);
        }
        Err(e) => {
            println!("{}", e);
        }
    }
}
