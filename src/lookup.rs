//! Name resolution: the destination before a run, responders during it.

use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

use crate::error::TraceError;
use crate::socket::SocketFamily;

/// Resolves `host` to an address, preferring `family` when given.
///
/// Address literals are used as they are.
pub fn resolve_host(host: &str, family: Option<SocketFamily>) -> Result<IpAddr, TraceError> {
    if let Ok(ip_addr) = host.parse::<IpAddr>() {
        return match family {
            Some(family) if SocketFamily::from_ip(&ip_addr) != family => {
                Err(TraceError::AddressFamilyMismatch)
            }
            _ => Ok(ip_addr),
        };
    }
    let addrs = dns_lookup::lookup_host(host).map_err(|e| TraceError::Resolve {
        host: host.to_string(),
        reason: e.to_string(),
    })?;
    let found = match family {
        Some(family) => addrs
            .iter()
            .find(|addr| SocketFamily::from_ip(addr) == family)
            .copied(),
        // traceroute picks IPv4 unless told otherwise
        None => addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied(),
    };
    found.ok_or_else(|| TraceError::Resolve {
        host: host.to_string(),
        reason: "no address of the requested family".to_string(),
    })
}

/// Source of reverse lookups.
pub trait NameLookup {
    /// Host name of `ip_addr`, or `None` when it has none.
    fn lookup_addr(&self, ip_addr: &IpAddr) -> Option<String>;
}

/// Reverse lookups through the system resolver.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLookup;

impl NameLookup for SystemLookup {
    fn lookup_addr(&self, ip_addr: &IpAddr) -> Option<String> {
        match dns_lookup::lookup_addr(ip_addr) {
            Ok(name) => Some(name),
            Err(e) => {
                debug!(%ip_addr, error = %e, "reverse lookup failed");
                None
            }
        }
    }
}

/// Reverse lookup of responder addresses, cached for one run.
///
/// Lookups block, so callers resolve once a hop's attempts are settled,
/// never while responses are still being received.
pub struct Resolver {
    numeric: bool,
    lookup: Box<dyn NameLookup>,
    cache: HashMap<IpAddr, String>,
}

impl Resolver {
    /// `numeric` turns lookups off; every address maps to its own string.
    pub fn new(numeric: bool) -> Resolver {
        Resolver::with_lookup(numeric, SystemLookup)
    }

    pub fn with_lookup<L>(numeric: bool, lookup: L) -> Resolver
    where
        L: NameLookup + 'static,
    {
        Resolver {
            numeric,
            lookup: Box::new(lookup),
            cache: HashMap::new(),
        }
    }

    pub fn host_name(&mut self, ip_addr: IpAddr) -> String {
        if self.numeric {
            return ip_addr.to_string();
        }
        let lookup = &self.lookup;
        self.cache
            .entry(ip_addr)
            .or_insert_with(|| {
                lookup
                    .lookup_addr(&ip_addr)
                    .unwrap_or_else(|| ip_addr.to_string())
            })
            .clone()
    }
}
