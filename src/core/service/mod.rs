//! Packet processing services for different network layers.
//!
//! The `service` module deals with packet transmission and reception logic at
//! different layers of the network stack. A `Stack` ties the services for one
//! link together.

pub mod arp;
pub mod icmpv4;
pub mod ipv4;
pub mod udp;

use std::fmt;
use std::sync::Arc;

use crate::core::config::{
    NetConf,
    StackConfig,
};
use crate::core::link::{
    Capture,
    Dispatcher,
    Link,
};
use crate::core::repr::{
    eth_types,
    ipv4_protocols,
    EthernetAddress,
    Ipv4Address,
};
use crate::core::time::SystemEnv;
use crate::{
    Error,
    Result,
};

use self::arp::ArpService;
use self::icmpv4::Icmpv4Service;
use self::ipv4::{
    Ipv4Service,
    Outbox,
};
use self::udp::UdpService;

/// A network stack on a link, processing inbound frames on a dedicated
/// capture thread for as long as it lives.
///
/// Responses to inbound traffic are sent from an outbox thread, leaving the
/// capture thread free to process the ARP replies they may wait on.
pub struct Stack {
    arp: Arc<ArpService>,
    ipv4: Arc<Ipv4Service>,
    icmpv4: Arc<Icmpv4Service>,
    udp: Arc<UdpService>,
    // Stops capturing before the outbox goes away.
    _capture: Capture,
    _outbox: Outbox,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stack").finish()
    }
}

impl Stack {
    /// Brings up a stack on a link.
    ///
    /// ARP comes up first and checks that no other host answers for the
    /// local address, failing with Error::DuplicateAddress if one does. The
    /// remaining interface configuration is read afterwards, and any missing
    /// piece fails initialization.
    pub fn new(link: Arc<dyn Link>, netconf: &dyn NetConf, config: StackConfig) -> Result<Stack> {
        let eth_addr = link.ethernet_addr();
        let ipv4_addr = netconf.ipv4_addr()?;
        info!("Initializing ARP for {} at {}.", ipv4_addr, eth_addr);

        let dispatcher = Arc::new(Dispatcher::new(eth_addr));
        let arp = Arc::new(ArpService::new(
            link.clone(),
            ipv4_addr,
            &config,
            SystemEnv::new(),
        ));
        dispatcher.register(eth_types::ARP, arp.clone());

        let capture = Capture::spawn(link.clone(), dispatcher.clone())?;

        if let Some(dup_addr) = arp.resolve(ipv4_addr) {
            warn!("{} is already in use by {}.", ipv4_addr, dup_addr);
            return Err(Error::DuplicateAddress(ipv4_addr, dup_addr));
        }
        info!("ARP initialized.");

        let mtu = netconf.max_transmission_unit()?;
        let netmask = netconf.netmask()?;
        let default_gateway = netconf.default_gateway()?;
        info!(
            "Initializing IPv4 with MTU {}, netmask {} and gateway {}.",
            mtu, netmask, default_gateway
        );

        let ipv4 = Arc::new(Ipv4Service::new(
            link,
            arp.clone(),
            netmask,
            default_gateway,
            mtu,
            &config,
        )?);
        let outbox = Outbox::spawn(&ipv4)?;
        dispatcher.register(eth_types::IPV4, ipv4.clone());

        let icmpv4 = Arc::new(Icmpv4Service::with_echo_timeout(config.icmp_echo_timeout));
        ipv4.register_protocol(ipv4_protocols::ICMP, icmpv4.clone());

        let udp = Arc::new(UdpService::new());
        ipv4.register_protocol(ipv4_protocols::UDP, udp.clone());

        info!("Stack initialized.");

        Ok(Stack {
            arp,
            ipv4,
            icmpv4,
            udp,
            _capture: capture,
            _outbox: outbox,
        })
    }

    pub fn eth_addr(&self) -> EthernetAddress {
        self.arp.eth_addr()
    }

    pub fn ipv4_addr(&self) -> Ipv4Address {
        self.arp.ipv4_addr()
    }

    pub fn arp(&self) -> &Arc<ArpService> {
        &self.arp
    }

    pub fn ipv4(&self) -> &Arc<Ipv4Service> {
        &self.ipv4
    }

    pub fn icmpv4(&self) -> &Arc<Icmpv4Service> {
        &self.icmpv4
    }

    pub fn udp(&self) -> &Arc<UdpService> {
        &self.udp
    }

    /// Sends an echo request, see Icmpv4Service::send_echo_request(...).
    pub fn ping(&self, dst_addr: Ipv4Address, id: u16, seq: u16, payload: &[u8]) -> Result<()> {
        self.icmpv4
            .send_echo_request(&self.ipv4, dst_addr, id, seq, payload)
    }

    /// Sends a UDP datagram, see UdpService::send(...).
    pub fn send_udp(&self, dst_addr: Ipv4Address, dst_port: u16, payload: &[u8]) -> Result<u16> {
        self.udp.send(&self.ipv4, dst_addr, dst_port, payload)
    }
}
