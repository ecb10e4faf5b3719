use crate::error::SetupError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

pub trait Resolver {
    /// One routable IPv4 address for `host`.
    fn resolve(&self, host: &str) -> Result<Ipv4Addr, SetupError>;

    /// Name to show for `addr`, its numeric form when there is none.
    fn display_name(&self, addr: Ipv4Addr) -> String;
}

/// Dotted quads are used as is, anything else goes through the system resolver.
pub fn lookup_ipv4(host: &str) -> Result<Ipv4Addr, SetupError> {
    if let Ok(addr) = host.parse() {
        return Ok(addr);
    }
    dns_lookup::lookup_host(host)
        .ok()
        .and_then(|addrs| {
            addrs.into_iter().find_map(|addr| match addr {
                IpAddr::V4(addr) => Some(addr),
                IpAddr::V6(_) => None,
            })
        })
        .ok_or_else(|| SetupError::UnknownHost(host.to_string()))
}

/// Names kept by a [`DnsResolver`] before it stops caching.
pub const MAX_CACHED_NAMES: usize = 1024;

/// Reverse lookups through the system resolver, each address looked up once.
///
/// At most `capacity` names are kept; addresses seen after that are looked up
/// every time. Lookups block the event loop.
#[derive(Debug)]
pub struct DnsResolver {
    names: RefCell<HashMap<Ipv4Addr, String>>,
    capacity: usize,
}

impl DnsResolver {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHED_NAMES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            names: RefCell::new(HashMap::new()),
            capacity,
        }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn reverse_lookup(addr: Ipv4Addr) -> String {
    dns_lookup::lookup_addr(&IpAddr::V4(addr)).unwrap_or_else(|error| {
        log::debug!("no name for {}: {}", addr, error);
        addr.to_string()
    })
}

impl Resolver for DnsResolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr, SetupError> {
        lookup_ipv4(host)
    }

    fn display_name(&self, addr: Ipv4Addr) -> String {
        let mut names = self.names.borrow_mut();
        if let Some(name) = names.get(&addr) {
            return name.clone();
        }
        let name = reverse_lookup(addr);
        if names.len() < self.capacity {
            names.insert(addr, name.clone());
        }
        name
    }
}

/// Never does reverse lookups.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericResolver;

impl Resolver for NumericResolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr, SetupError> {
        lookup_ipv4(host)
    }

    fn display_name(&self, addr: Ipv4Addr) -> String {
        addr.to_string()
    }
}
