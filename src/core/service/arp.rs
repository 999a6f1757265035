use std::collections::HashMap;
use std::sync::{
    Arc,
    Condvar,
    Mutex,
    MutexGuard,
};
use std::time::{
    Duration,
    Instant,
};

use crate::core::arp_cache::ArpCache;
use crate::core::config::StackConfig;
use crate::core::link::{
    FrameHandler,
    FrameMeta,
    Link,
};
use crate::core::repr::{
    eth_types,
    Arp,
    ArpOp,
    EthernetAddress,
    Ipv4Address,
};
use crate::core::time::{
    Env,
    SystemEnv,
};
use crate::{
    Error,
    Result,
};

/// State of an in flight resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resolution {
    Waiting,
    Resolved(EthernetAddress),
    Failed,
}

impl Resolution {
    fn eth_addr(self) -> Option<EthernetAddress> {
        match self {
            Resolution::Resolved(eth_addr) => Some(eth_addr),
            _ => None,
        }
    }
}

/// An in flight resolution, finished by the reply handler or by the caller
/// that started it giving up.
#[derive(Debug)]
struct Pending {
    resolution: Mutex<Resolution>,
    finished: Condvar,
}

impl Default for Pending {
    fn default() -> Pending {
        Pending {
            resolution: Mutex::new(Resolution::Waiting),
            finished: Condvar::new(),
        }
    }
}

impl Pending {
    /// Finishes the resolution and wakes every waiter. Only the first call
    /// has an effect.
    fn finish(&self, resolution: Resolution) {
        let mut current = self.resolution.lock().unwrap_or_else(|err| err.into_inner());
        if *current == Resolution::Waiting {
            *current = resolution;
            self.finished.notify_all();
        }
    }

    /// Waits until the resolution is finished or the timeout elapses.
    fn wait(&self, timeout: Duration) -> Resolution {
        let deadline = Instant::now() + timeout;
        let mut resolution = self.resolution.lock().unwrap_or_else(|err| err.into_inner());

        loop {
            if *resolution != Resolution::Waiting {
                return *resolution;
            }

            let now = Instant::now();
            if now >= deadline {
                return Resolution::Waiting;
            }

            resolution = match self.finished.wait_timeout(resolution, deadline - now) {
                Ok((resolution, _)) => resolution,
                Err(err) => err.into_inner().0,
            };
        }
    }
}

/// Resolves IPv4 addresses to Ethernet addresses and answers ARP requests for
/// the local address.
pub struct ArpService<T = SystemEnv>
where
    T: Env,
{
    link: Arc<dyn Link>,
    eth_addr: EthernetAddress,
    ipv4_addr: Ipv4Address,
    cache: Mutex<ArpCache<T>>,
    pending: Mutex<HashMap<Ipv4Address, Arc<Pending>>>,
    retries: usize,
    retry_interval: Duration,
}

impl<T: Env> ArpService<T> {
    /// Creates an ARP service answering for ipv4_addr on a link.
    pub fn new(
        link: Arc<dyn Link>,
        ipv4_addr: Ipv4Address,
        config: &StackConfig,
        time_env: T,
    ) -> ArpService<T> {
        let eth_addr = link.ethernet_addr();
        ArpService {
            link,
            eth_addr,
            ipv4_addr,
            cache: Mutex::new(ArpCache::new(
                config.arp_cache_expiration,
                config.arp_cache_capacity,
                time_env,
            )),
            pending: Mutex::new(HashMap::new()),
            retries: config.arp_retries,
            retry_interval: config.arp_retry_interval,
        }
    }

    pub fn eth_addr(&self) -> EthernetAddress {
        self.eth_addr
    }

    pub fn ipv4_addr(&self) -> Ipv4Address {
        self.ipv4_addr
    }

    /// Resolves an IPv4 address to an Ethernet address.
    ///
    /// A cached mapping is returned without sending anything. Otherwise a
    /// request is broadcast and sent again after each retry interval while
    /// unanswered, up to the configured number of retries. Callers resolving
    /// an address that is already being resolved wait on the same request.
    pub fn resolve(&self, ipv4_addr: Ipv4Address) -> Option<EthernetAddress> {
        if let Some(eth_addr) = self.lock_cache().eth_addr_for_ip(ipv4_addr) {
            debug!("ARP cache hit for {} at {}.", ipv4_addr, eth_addr);
            return Some(eth_addr);
        }

        let (pending, owner) = {
            let mut pending = self.lock_pending();
            match pending.get(&ipv4_addr) {
                Some(entry) => (entry.clone(), false),
                None => {
                    let entry = Arc::new(Pending::default());
                    pending.insert(ipv4_addr, entry.clone());
                    (entry, true)
                }
            }
        };

        if owner {
            self.send_request(ipv4_addr);
        }

        let mut resolution = Resolution::Waiting;
        for _ in 0 .. self.retries {
            resolution = pending.wait(self.retry_interval);
            if resolution != Resolution::Waiting {
                break;
            }
            if owner {
                self.send_request(ipv4_addr);
            }
        }

        if resolution == Resolution::Waiting {
            resolution = pending.wait(Duration::from_millis(0));
        }

        if owner && resolution == Resolution::Waiting {
            let ours = {
                let mut table = self.lock_pending();
                let ours = table
                    .get(&ipv4_addr)
                    .map_or(false, |entry| Arc::ptr_eq(entry, &pending));
                if ours {
                    table.remove(&ipv4_addr);
                }
                ours
            };

            resolution = if ours {
                // Wakes callers that joined late and are still waiting.
                pending.finish(Resolution::Failed);
                Resolution::Failed
            } else {
                // A reply took the entry and is about to finish it.
                pending.wait(self.retry_interval)
            };
        }

        let eth_addr = resolution.eth_addr();
        match eth_addr {
            Some(eth_addr) => debug!("Resolved {} to {}.", ipv4_addr, eth_addr),
            None => debug!("Unable to resolve {}.", ipv4_addr),
        }

        eth_addr
    }

    /// Answers a request for the local address.
    ///
    /// Requests whose sender hardware address differs from the frame's source
    /// or which target another address are ignored.
    pub fn handle_request(&self, src_addr: EthernetAddress, arp: &Arp) -> Result<()> {
        if arp.source_hw_addr != src_addr {
            debug!(
                "Ignoring ARP request claiming {} from {}.",
                arp.source_hw_addr, src_addr
            );
            return Err(Error::Ignored);
        }

        if arp.target_proto_addr != self.ipv4_addr {
            debug!(
                "Ignoring ARP request for {}.",
                arp.target_proto_addr
            );
            return Err(Error::Ignored);
        }

        let reply = Arp {
            op: ArpOp::Reply,
            source_hw_addr: self.eth_addr,
            source_proto_addr: self.ipv4_addr,
            target_hw_addr: arp.source_hw_addr,
            target_proto_addr: arp.source_proto_addr,
        };

        debug!(
            "Sending ARP reply to {}/{}.",
            reply.target_proto_addr, reply.target_hw_addr
        );
        self.send_packet(&reply, reply.target_hw_addr)
    }

    /// Completes the pending resolution a reply answers and caches the
    /// mapping.
    ///
    /// Replies whose sender hardware address differs from the frame's source,
    /// which target another address or which answer nothing pending are
    /// ignored.
    pub fn handle_reply(&self, src_addr: EthernetAddress, arp: &Arp) -> Result<()> {
        if arp.source_hw_addr != src_addr {
            debug!(
                "Ignoring ARP reply claiming {} from {}.",
                arp.source_hw_addr, src_addr
            );
            return Err(Error::Ignored);
        }

        if arp.target_proto_addr != self.ipv4_addr {
            debug!(
                "Ignoring ARP reply for {}.",
                arp.target_proto_addr
            );
            return Err(Error::Ignored);
        }

        let mut table = self.lock_pending();
        if !table.contains_key(&arp.source_proto_addr) {
            debug!(
                "Ignoring unsolicited ARP reply from {}.",
                arp.source_proto_addr
            );
            return Err(Error::Ignored);
        }

        debug!(
            "Received ARP reply, adding mapping from {} to {}.",
            arp.source_proto_addr, arp.source_hw_addr
        );

        // Cached before the entry is removed so concurrent resolutions find
        // one or the other.
        self.lock_cache()
            .set_eth_addr_for_ip(arp.source_proto_addr, arp.source_hw_addr);

        let pending = table.remove(&arp.source_proto_addr);
        drop(table);
        if let Some(pending) = pending {
            pending.finish(Resolution::Resolved(arp.source_hw_addr));
        }

        Ok(())
    }

    /// Returns the live cache entries, ordered by IPv4 address.
    pub fn cache_entries(&self) -> Vec<(Ipv4Address, EthernetAddress)> {
        self.lock_cache().entries()
    }

    fn send_request(&self, ipv4_addr: Ipv4Address) {
        let request = Arp {
            op: ArpOp::Request,
            source_hw_addr: self.eth_addr,
            source_proto_addr: self.ipv4_addr,
            target_hw_addr: EthernetAddress::UNSPECIFIED,
            target_proto_addr: ipv4_addr,
        };

        debug!("Sending ARP request for {}.", ipv4_addr);
        if let Err(err) = self.send_packet(&request, EthernetAddress::BROADCAST) {
            warn!("Error sending ARP request for {} with {:?}.", ipv4_addr, err);
        }
    }

    fn send_packet(&self, arp: &Arp, dst_addr: EthernetAddress) -> Result<()> {
        let mut buffer = [0; Arp::BUFFER_LEN];
        arp.serialize(&mut buffer)?;
        self.link.send_frame(&buffer, eth_types::ARP, dst_addr)
    }

    fn recv_packet(&self, payload: &[u8], src_addr: EthernetAddress) -> Result<()> {
        let arp = Arp::deserialize(payload)?;
        match arp.op {
            ArpOp::Request => self.handle_request(src_addr, &arp),
            ArpOp::Reply => self.handle_reply(src_addr, &arp),
        }
    }

    fn lock_cache(&self) -> MutexGuard<ArpCache<T>> {
        self.cache.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<HashMap<Ipv4Address, Arc<Pending>>> {
        self.pending.lock().unwrap_or_else(|err| err.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn seed_cache(&self, ipv4_addr: Ipv4Address, eth_addr: EthernetAddress) {
        self.lock_cache().set_eth_addr_for_ip(ipv4_addr, eth_addr);
    }
}

impl<T: Env> FrameHandler for ArpService<T> {
    fn recv_frame(&self, _: &FrameMeta, payload: &[u8], src_addr: EthernetAddress) {
        match self.recv_packet(payload, src_addr) {
            Ok(_) | Err(Error::Ignored) => {}
            Err(err) => debug!("Dropping ARP packet from {} with {:?}.", src_addr, err),
        }
    }
}
