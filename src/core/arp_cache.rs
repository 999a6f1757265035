use std::collections::HashMap;
use std::time::{
    Duration,
    Instant,
};

use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use crate::core::time::{
    Env,
    SystemEnv,
};

#[derive(Debug)]
struct Entry {
    eth_addr: EthernetAddress,
    in_cache_since: Instant,
}

/// Maintains an expiring set of IPv4 -> ethernet address mappings.
///
/// An entry lives for a fixed duration from when it was (last) set. When the
/// cache is full, setting a new mapping evicts the oldest entry.
#[derive(Debug)]
pub struct ArpCache<T = SystemEnv>
where
    T: Env,
{
    entries: HashMap<Ipv4Address, Entry>,
    expiration: Duration,
    capacity: usize,
    time_env: T,
}

impl<T: Env> ArpCache<T> {
    /// Creates an ARP cache holding at most capacity mappings, each expiring
    /// after expiration.
    pub fn new(expiration: Duration, capacity: usize, time_env: T) -> ArpCache<T> {
        ArpCache {
            entries: HashMap::new(),
            expiration,
            capacity: capacity.max(1),
            time_env,
        }
    }

    /// Lookup the ethernet address for an IPv4 address.
    pub fn eth_addr_for_ip(&mut self, ipv4_addr: Ipv4Address) -> Option<EthernetAddress> {
        self.expire_eth_addr();
        self.entries.get(&ipv4_addr).map(|entry| entry.eth_addr)
    }

    /// Create or update the ethernet address mapping for an IPv4 address.
    pub fn set_eth_addr_for_ip(&mut self, ipv4_addr: Ipv4Address, eth_addr: EthernetAddress) {
        self.expire_eth_addr();

        if !self.entries.contains_key(&ipv4_addr) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.in_cache_since)
                .map(|(ipv4_addr, _)| *ipv4_addr);
            if let Some(oldest) = oldest {
                debug!("Evicting ARP cache entry for {}.", oldest);
                self.entries.remove(&oldest);
            }
        }

        let in_cache_since = self.time_env.now_instant();
        self.entries.insert(
            ipv4_addr,
            Entry {
                eth_addr,
                in_cache_since,
            },
        );
    }

    /// Returns the live mappings, ordered by IPv4 address.
    pub fn entries(&mut self) -> Vec<(Ipv4Address, EthernetAddress)> {
        self.expire_eth_addr();
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(ipv4_addr, entry)| (*ipv4_addr, entry.eth_addr))
            .collect();
        entries.sort();
        entries
    }

    /// Purge Ethernet address entries that have expired.
    fn expire_eth_addr(&mut self) {
        let now = self.time_env.now_instant();
        let expiration = self.expiration;
        self.entries
            .retain(|_, entry| now.duration_since(entry.in_cache_since) < expiration);
    }
}
