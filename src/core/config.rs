//! Interface configuration and stack tunables.

use std::time::Duration;

use crate::core::repr::Ipv4Address;
use crate::Result;

/// A source of interface configuration, queried once when a stack starts.
pub trait NetConf {
    /// Returns the IPv4 address of the interface.
    fn ipv4_addr(&self) -> Result<Ipv4Address>;

    /// Returns the subnet mask of the interface.
    fn netmask(&self) -> Result<Ipv4Address>;

    /// Returns the gateway for destinations outside the subnet.
    fn default_gateway(&self) -> Result<Ipv4Address>;

    /// Returns the [MTU](https://en.wikipedia.org/wiki/Maximum_transmission_unit)
    /// of the interface.
    fn max_transmission_unit(&self) -> Result<usize>;
}

/// Interface configuration with fixed values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticNetConf {
    pub ipv4_addr: Ipv4Address,
    pub netmask: Ipv4Address,
    pub default_gateway: Ipv4Address,
    pub mtu: usize,
}

impl NetConf for StaticNetConf {
    fn ipv4_addr(&self) -> Result<Ipv4Address> {
        Ok(self.ipv4_addr)
    }

    fn netmask(&self) -> Result<Ipv4Address> {
        Ok(self.netmask)
    }

    fn default_gateway(&self) -> Result<Ipv4Address> {
        Ok(self.default_gateway)
    }

    fn max_transmission_unit(&self) -> Result<usize> {
        Ok(self.mtu)
    }
}

/// Tunables for a network stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
    /// How long a resolved ARP mapping stays cached.
    pub arp_cache_expiration: Duration,
    /// Maximum number of cached ARP mappings.
    pub arp_cache_capacity: usize,
    /// How many times an unanswered ARP request is sent again.
    pub arp_retries: usize,
    /// How long to wait for an ARP reply before sending the request again.
    pub arp_retry_interval: Duration,
    /// TTL of outgoing IPv4 datagrams.
    pub ipv4_ttl: u8,
    /// Type of service of outgoing IPv4 datagrams.
    pub ipv4_tos: u8,
    /// Options appended to every outgoing IPv4 header, padded to 4 bytes.
    pub ipv4_options: Option<Vec<u8>>,
    /// How long the send time of an unanswered echo request is kept.
    pub icmp_echo_timeout: Duration,
}

impl Default for StackConfig {
    fn default() -> StackConfig {
        StackConfig {
            arp_cache_expiration: Duration::from_secs(10),
            arp_cache_capacity: 100,
            arp_retries: 3,
            arp_retry_interval: Duration::from_millis(500),
            ipv4_ttl: 64,
            ipv4_tos: 0,
            ipv4_options: None,
            icmp_echo_timeout: Duration::from_secs(60),
        }
    }
}
