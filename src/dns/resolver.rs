//! Hostname to IPv4 resolution over raw UDP

use super::codec::{encode_query, parse_response, MAX_DATAGRAM_LEN};
use super::DatagramSocket;
use crate::clock::{elapsed_ms, Clock};
use crate::config::DnsSection;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

pub const DNS_PORT: u16 = 53;

/// Datagrams drained per tick
const MAX_RECEIVE_PER_TICK: usize = 4;

/// When queries are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Minimum spacing between queries
    pub query_interval: Duration,
    /// Re-query a resolved name after this long, serving the cached address
    /// meanwhile. `None` keeps an address until [`AddressResolver::invalidate`].
    pub refresh_after: Option<Duration>,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self::from(&DnsSection::default())
    }
}

impl From<&DnsSection> for ResolverPolicy {
    fn from(section: &DnsSection) -> Self {
        Self {
            query_interval: Duration::from_millis(u64::from(section.query_interval_ms)),
            refresh_after: section.refresh_secs.map(Duration::from_secs),
        }
    }
}

/// Resolves one domain at a time against a fixed DNS server
///
/// Literal addresses resolve without any I/O. At most one query is in flight;
/// each query gets the next transaction id and only a response carrying that
/// id is accepted.
pub struct AddressResolver<S: DatagramSocket> {
    socket: S,
    clock: Rc<dyn Clock>,
    server: SocketAddrV4,
    policy: ResolverPolicy,
    domain: String,
    transaction_id: u16,
    last_sent_ms: Option<u32>,
    resolved: Option<Ipv4Addr>,
    resolved_at_ms: u32,
}

impl<S: DatagramSocket> AddressResolver<S> {
    pub fn new(socket: S, clock: Rc<dyn Clock>, server: Ipv4Addr, policy: ResolverPolicy) -> Self {
        Self {
            socket,
            clock,
            server: SocketAddrV4::new(server, DNS_PORT),
            policy,
            domain: String::new(),
            transaction_id: 0,
            last_sent_ms: None,
            resolved: None,
            resolved_at_ms: 0,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Start resolving `domain`, dropping any cached address and in-flight query.
    pub fn set_domain(&mut self, domain: &str) {
        self.domain = domain.to_string();
        self.invalidate();
    }

    /// Forget the cached address; the next tick queries again.
    pub fn invalidate(&mut self) {
        self.resolved = None;
        self.last_sent_ms = None;
    }

    pub fn resolved_ip(&self) -> Option<Ipv4Addr> {
        self.resolved
    }

    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    pub fn is_literal(&self) -> bool {
        self.domain.parse::<Ipv4Addr>().is_ok()
    }

    pub fn tick(&mut self) {
        if self.domain.is_empty() {
            return;
        }

        if self.resolved.is_none() {
            if let Ok(ip) = self.domain.parse::<Ipv4Addr>() {
                self.store(ip);
                return;
            }
        }

        let now = self.clock.now_ms();
        if self.wants_query(now) && self.interval_elapsed(now) {
            self.send_query();
            self.last_sent_ms = Some(now);
        }

        if self.last_sent_ms.is_some() {
            self.receive_responses();
        }
    }

    /// Send one query for the current domain with a fresh transaction id.
    pub fn send_query(&mut self) {
        let _span = crate::dns_span!(domain = %self.domain).entered();
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let query = match encode_query(self.transaction_id, &self.domain) {
            Ok(query) => query,
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Cannot encode DNS query");
                return;
            }
        };

        match self.socket.send_to(&query, self.server) {
            Ok(()) => {
                debug!(domain = %self.domain, id = self.transaction_id, server = %self.server, "DNS query sent");
            }
            Err(e) => {
                debug!(domain = %self.domain, error = %e, "DNS query send failed");
            }
        }
    }

    fn wants_query(&self, now: u32) -> bool {
        if self.is_literal() {
            return false;
        }
        match (self.resolved, self.policy.refresh_after) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(refresh)) => {
                u128::from(elapsed_ms(now, self.resolved_at_ms)) > refresh.as_millis()
            }
        }
    }

    fn interval_elapsed(&self, now: u32) -> bool {
        match self.last_sent_ms {
            None => true,
            Some(sent) => u128::from(elapsed_ms(now, sent)) > self.policy.query_interval.as_millis(),
        }
    }

    fn receive_responses(&mut self) {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        for _ in 0..MAX_RECEIVE_PER_TICK {
            let len = match self.socket.try_recv(&mut buf) {
                Ok(Some(len)) => len,
                Ok(None) => return,
                Err(e) => {
                    trace!(error = %e, "DNS receive failed");
                    return;
                }
            };

            match parse_response(self.transaction_id, &buf[..len]) {
                Some(ip) => {
                    self.store(ip);
                    return;
                }
                None => trace!(len, "Discarding DNS datagram"),
            }
        }
    }

    fn store(&mut self, ip: Ipv4Addr) {
        if self.resolved != Some(ip) {
            info!(domain = %self.domain, ip = %ip, "Domain resolved");
        }
        self.resolved = Some(ip);
        self.resolved_at_ms = self.clock.now_ms();
        self.last_sent_ms = None;
    }
}
