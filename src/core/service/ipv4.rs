use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::sync::mpsc::{
    channel,
    Receiver,
    RecvTimeoutError,
    Sender,
};
use std::sync::{
    Arc,
    Mutex,
    RwLock,
    Weak,
};
use std::thread::{
    self,
    JoinHandle,
};
use std::time::Duration;

use crate::core::config::StackConfig;
use crate::core::link::{
    FrameHandler,
    FrameMeta,
    Link,
};
use crate::core::repr::ipv4::pad_options;
use crate::core::repr::{
    eth_types,
    ipv4_protocols,
    EthernetAddress,
    Ipv4Address,
    Ipv4Packet,
    Ipv4Repr,
};
use crate::core::service::arp::ArpService;
use crate::{
    Error,
    Result,
};

/// A consumer of IPv4 payloads for a particular protocol.
pub trait ProtocolHandler: Send + Sync {
    /// Processes the payload of a datagram sent by src_addr.
    ///
    /// The service the datagram arrived on is passed along for sending
    /// responses.
    fn recv_packet(
        &self,
        ipv4: &Ipv4Service,
        meta: &FrameMeta,
        payload: &[u8],
        src_addr: Ipv4Address,
    );
}

/// A slice of a datagram's payload sent in one packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Offset of the slice within the payload, in bytes.
    pub offset: usize,
    pub len: usize,
    pub more_fragments: bool,
}

/// Splits a payload into fragments fitting an MTU.
///
/// Every fragment but the last carries the largest multiple of 8 bytes that
/// fits after the header. An empty payload still yields one fragment.
pub fn plan_fragments(payload_len: usize, header_len: usize, mtu: usize) -> Result<Vec<Fragment>> {
    if header_len + payload_len > Ipv4Packet::<&[u8]>::MAX_PACKET_LEN {
        return Err(Error::Exhausted);
    }

    let max_fragment_len = mtu.saturating_sub(header_len) & !7;
    if max_fragment_len == 0 {
        return Err(Error::Config("MTU too small for an IPv4 header"));
    }

    let mut fragments = Vec::new();
    let mut offset = 0;
    loop {
        let len = (payload_len - offset).min(max_fragment_len);
        let more_fragments = offset + len < payload_len;
        fragments.push(Fragment {
            offset,
            len,
            more_fragments,
        });
        offset += len;
        if !more_fragments {
            return Ok(fragments);
        }
    }
}

/// Sends and receives IPv4 datagrams, demultiplexing received payloads to
/// registered protocol handlers.
pub struct Ipv4Service {
    link: Arc<dyn Link>,
    arp: Arc<ArpService>,
    ipv4_addr: Ipv4Address,
    netmask: Ipv4Address,
    default_gateway: Ipv4Address,
    mtu: usize,
    ttl: u8,
    tos: u8,
    options: Vec<u8>,
    identification: Mutex<u16>,
    handlers: RwLock<HashMap<u8, Arc<dyn ProtocolHandler>>>,
    outbox: Mutex<Option<Sender<Outgoing>>>,
}

impl fmt::Debug for Ipv4Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Ipv4Service").finish()
    }
}

impl Ipv4Service {
    /// Creates an IPv4 service for an interface.
    ///
    /// Fails with Error::Malformed if the configured options do not fit in an
    /// IPv4 header.
    pub fn new(
        link: Arc<dyn Link>,
        arp: Arc<ArpService>,
        netmask: Ipv4Address,
        default_gateway: Ipv4Address,
        mtu: usize,
        config: &StackConfig,
    ) -> Result<Ipv4Service> {
        let options = config
            .ipv4_options
            .as_ref()
            .map(|options| pad_options(options))
            .unwrap_or_default();

        if Ipv4Packet::<&[u8]>::MIN_HEADER_LEN + options.len() > Ipv4Packet::<&[u8]>::MAX_HEADER_LEN {
            return Err(Error::Malformed);
        }

        Ok(Ipv4Service {
            link,
            ipv4_addr: arp.ipv4_addr(),
            arp,
            netmask,
            default_gateway,
            mtu,
            ttl: config.ipv4_ttl,
            tos: config.ipv4_tos,
            options,
            identification: Mutex::new(0),
            handlers: RwLock::new(HashMap::new()),
            outbox: Mutex::new(None),
        })
    }

    pub fn ipv4_addr(&self) -> Ipv4Address {
        self.ipv4_addr
    }

    pub fn netmask(&self) -> Ipv4Address {
        self.netmask
    }

    pub fn default_gateway(&self) -> Ipv4Address {
        self.default_gateway
    }

    pub fn max_transmission_unit(&self) -> usize {
        self.mtu
    }

    /// Returns the address a datagram for dst_addr is sent to on the link.
    pub fn next_hop(&self, dst_addr: Ipv4Address) -> Ipv4Address {
        if dst_addr.is_same_subnet(self.ipv4_addr, self.netmask) {
            dst_addr
        } else {
            self.default_gateway
        }
    }

    /// Sends a payload to dst_addr, fragmenting it to fit the MTU.
    ///
    /// The next hop is resolved once and all fragments share one
    /// identification. Fails with Error::MacResolution if the next hop can
    /// not be resolved.
    pub fn send(&self, dst_addr: Ipv4Address, payload: &[u8], protocol: u8) -> Result<()> {
        let header_len = Ipv4Packet::<&[u8]>::MIN_HEADER_LEN + self.options.len();
        let fragments = plan_fragments(payload.len(), header_len, self.mtu)?;

        let next_hop = self.next_hop(dst_addr);
        let eth_addr = self
            .arp
            .resolve(next_hop)
            .ok_or(Error::MacResolution(next_hop))?;

        let identification = self.next_identification();

        debug!(
            "Sending IPv4 datagram {} to {} via {} in {} fragment(s).",
            identification,
            dst_addr,
            next_hop,
            fragments.len()
        );

        for fragment in fragments {
            let ipv4_repr = Ipv4Repr {
                src_addr: self.ipv4_addr,
                dst_addr,
                protocol,
                tos: self.tos,
                ttl: self.ttl,
                identification,
                more_fragments: fragment.more_fragments,
                fragment_offset: fragment.offset,
                options: self.options.clone(),
                payload_len: fragment.len,
            };

            self.send_packet(
                &ipv4_repr,
                &payload[fragment.offset .. fragment.offset + fragment.len],
                eth_addr,
            )?;
        }

        Ok(())
    }

    /// Sends a payload from a thread that must not wait on ARP, such as the
    /// capture thread.
    ///
    /// The datagram is queued for the Outbox when one is attached and sent
    /// right away otherwise. Queued datagrams that fail to send are logged.
    pub fn send_deferred(&self, dst_addr: Ipv4Address, payload: Vec<u8>, protocol: u8) -> Result<()> {
        let outbox = self
            .outbox
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone();

        match outbox {
            Some(outbox) => {
                debug!("Queueing IPv4 datagram to {}.", dst_addr);
                outbox
                    .send(Outgoing {
                        dst_addr,
                        payload,
                        protocol,
                    })
                    .map_err(|_| Error::Exhausted)
            }
            None => self.send(dst_addr, &payload, protocol),
        }
    }

    /// Registers the handler for a protocol, replacing any previous one.
    ///
    /// Only ICMP, TCP and UDP can be registered, other protocols are ignored.
    pub fn register_protocol(&self, protocol: u8, handler: Arc<dyn ProtocolHandler>) {
        match protocol {
            ipv4_protocols::ICMP | ipv4_protocols::TCP | ipv4_protocols::UDP => {
                self.handlers
                    .write()
                    .unwrap_or_else(|err| err.into_inner())
                    .insert(protocol, handler);
            }
            _ => debug!("Ignoring registration for IPv4 protocol {}.", protocol),
        }
    }

    fn next_identification(&self) -> u16 {
        let mut identification = self
            .identification
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let current = *identification;
        *identification = current.wrapping_add(1);
        current
    }

    fn send_packet(
        &self,
        ipv4_repr: &Ipv4Repr,
        payload: &[u8],
        eth_addr: EthernetAddress,
    ) -> Result<()> {
        let mut buffer = vec![0; ipv4_repr.buffer_len()];
        {
            let mut ipv4_packet = Ipv4Packet::try_new(&mut buffer[..])?;
            ipv4_repr.serialize(&mut ipv4_packet)?;
            ipv4_packet.payload_mut().copy_from_slice(payload);
        }
        self.link.send_frame(&buffer, eth_types::IPV4, eth_addr)
    }

    fn recv_packet(&self, meta: &FrameMeta, buffer: &[u8]) -> Result<()> {
        let ipv4_packet = Ipv4Packet::try_new(buffer)?;
        ipv4_packet.check_encoding()?;

        debug!(
            "Received IPv4 packet with IHL {}, IPID {}, DF {}, MF {}, offset {}, source {}, destination {}, protocol {}.",
            ipv4_packet.header_len(),
            ipv4_packet.identification(),
            ipv4_packet.dont_fragment(),
            ipv4_packet.more_fragments(),
            ipv4_packet.fragment_offset(),
            ipv4_packet.src_addr(),
            ipv4_packet.dst_addr(),
            ipv4_packet.protocol(),
        );

        if ipv4_packet.fragment_offset() != 0 {
            debug!(
                "Ignoring IPv4 fragment {} at offset {}.",
                ipv4_packet.identification(),
                ipv4_packet.fragment_offset()
            );
            return Err(Error::Ignored);
        }

        let handler = self
            .handlers
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(&ipv4_packet.protocol())
            .cloned();

        match handler {
            Some(handler) => {
                handler.recv_packet(self, meta, ipv4_packet.payload(), ipv4_packet.src_addr());
                Ok(())
            }
            None => {
                debug!(
                    "Ignoring IPv4 packet with protocol {}.",
                    ipv4_packet.protocol()
                );
                Err(Error::Ignored)
            }
        }
    }
}

impl FrameHandler for Ipv4Service {
    fn recv_frame(&self, meta: &FrameMeta, payload: &[u8], src_addr: EthernetAddress) {
        match self.recv_packet(meta, payload) {
            Ok(_) | Err(Error::Ignored) => {}
            Err(err) => debug!("Dropping IPv4 packet from {} with {:?}.", src_addr, err),
        }
    }
}

/// A datagram waiting in the Outbox.
#[derive(Debug)]
struct Outgoing {
    dst_addr: Ipv4Address,
    payload: Vec<u8>,
    protocol: u8,
}

/// A worker thread sending datagrams queued with
/// Ipv4Service::send_deferred(...), so resolving their next hop never stalls
/// the thread that queued them.
///
/// The thread is stopped and joined when the outbox is dropped. Datagrams
/// still queued at that point are discarded.
pub struct Outbox {
    ipv4: Weak<Ipv4Service>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Outbox {
    /// Starts a worker and attaches it to an IPv4 service.
    pub fn spawn(ipv4: &Arc<Ipv4Service>) -> Result<Outbox> {
        let (sender, receiver) = channel();
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = running.clone();
            let ipv4 = Arc::downgrade(ipv4);
            thread::Builder::new()
                .name("usrip-outbox".into())
                .spawn(move || drain(&ipv4, &receiver, &running))?
        };

        *ipv4.outbox.lock().unwrap_or_else(|err| err.into_inner()) = Some(sender);

        Ok(Outbox {
            ipv4: Arc::downgrade(ipv4),
            running,
            thread: Some(thread),
        })
    }

    /// Detaches the worker from its service and waits for it to exit.
    pub fn stop(&mut self) {
        if let Some(ipv4) = self.ipv4.upgrade() {
            ipv4.outbox.lock().unwrap_or_else(|err| err.into_inner()).take();
        }

        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Outbox thread panicked.");
            }
        }
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain(ipv4: &Weak<Ipv4Service>, receiver: &Receiver<Outgoing>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        let outgoing = match receiver.recv_timeout(Duration::from_millis(10)) {
            Ok(outgoing) => outgoing,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let ipv4 = match ipv4.upgrade() {
            Some(ipv4) => ipv4,
            None => break,
        };

        if let Err(err) = ipv4.send(outgoing.dst_addr, &outgoing.payload, outgoing.protocol) {
            warn!(
                "Error sending queued IPv4 datagram to {} with {:?}.",
                outgoing.dst_addr, err
            );
        }
    }
}
