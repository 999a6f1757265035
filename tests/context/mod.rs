#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use usrip::core::config::{
    StackConfig,
    StaticNetConf,
};
use usrip::core::repr::{
    EthernetAddress,
    EthernetFrame,
    Ipv4Address,
};
use usrip::core::service::Stack;
use usrip::core::wire::{
    Port,
    Wire,
};

lazy_static! {
    pub static ref HOST_A_IPV4_ADDR: Ipv4Address = Ipv4Address::new([10, 0, 0, 1]);

    pub static ref HOST_A_ETH_ADDR: EthernetAddress =
        EthernetAddress::new([0x06, 0x00, 0x00, 0x00, 0x00, 0x01]);

    pub static ref HOST_B_IPV4_ADDR: Ipv4Address = Ipv4Address::new([10, 0, 0, 2]);

    pub static ref HOST_B_ETH_ADDR: EthernetAddress =
        EthernetAddress::new([0x06, 0x00, 0x00, 0x00, 0x00, 0x02]);

    /// An IPv4 address not assigned to any hosts on the wire.
    pub static ref NO_HOST_IPV4_ADDR: Ipv4Address = Ipv4Address::new([10, 0, 0, 64]);

    /// Default gateway of both hosts, which is not on the wire either.
    pub static ref GATEWAY_IPV4_ADDR: Ipv4Address = Ipv4Address::new([10, 0, 0, 254]);

    pub static ref NETMASK: Ipv4Address = Ipv4Address::new([255, 255, 255, 0]);
}

pub const MTU: usize = 1500;

/// Two hosts running a stack each, attached to the same wire.
pub struct Context {
    pub wire: Wire,
    pub a: Stack,
    pub a_port: Arc<Port>,
    pub b: Stack,
    pub b_port: Arc<Port>,
}

/// Stack tunables with quick ARP retries, so tests involving unresolved
/// addresses finish promptly.
pub fn fast_config() -> StackConfig {
    StackConfig {
        arp_retry_interval: Duration::from_millis(50),
        ..StackConfig::default()
    }
}

pub fn netconf(ipv4_addr: Ipv4Address) -> StaticNetConf {
    StaticNetConf {
        ipv4_addr,
        netmask: *NETMASK,
        default_gateway: *GATEWAY_IPV4_ADDR,
        mtu: MTU,
    }
}

/// Brings up a stack on a new port of the wire.
pub fn host(
    wire: &Wire,
    eth_addr: EthernetAddress,
    ipv4_addr: Ipv4Address,
    config: StackConfig,
) -> (usrip::Result<Stack>, Arc<Port>) {
    let port = Arc::new(wire.attach(eth_addr));
    let stack = Stack::new(port.clone(), &netconf(ipv4_addr), config);
    (stack, port)
}

/// Runs a function f with two freshly started hosts.
pub fn run_with_config<F, R>(config: StackConfig, f: F) -> R
where
    F: FnOnce(&mut Context) -> R,
{
    let wire = Wire::new();

    // Hosts check their address concurrently to halve the start up time.
    let host_b = {
        let wire = wire.clone();
        let config = config.clone();
        thread::spawn(move || host(&wire, *HOST_B_ETH_ADDR, *HOST_B_IPV4_ADDR, config))
    };
    let (a, a_port) = host(&wire, *HOST_A_ETH_ADDR, *HOST_A_IPV4_ADDR, config);
    let (b, b_port) = host_b.join().unwrap();

    let mut context = Context {
        wire,
        a: a.unwrap(),
        a_port,
        b: b.unwrap(),
        b_port,
    };

    context.a_port.clear_sent_frames();
    context.b_port.clear_sent_frames();

    f(&mut context)
}

/// Like run_with_config(...), using fast_config().
pub fn run<F, R>(f: F) -> R
where
    F: FnOnce(&mut Context) -> R,
{
    run_with_config(fast_config(), f)
}

/// Returns the (destination, type, payload) of every frame sent by a port.
pub fn sent_frames(port: &Port) -> Vec<(EthernetAddress, u16, Vec<u8>)> {
    port.sent_frames()
        .iter()
        .map(|frame| {
            let eth_frame = EthernetFrame::try_new(&frame[..]).unwrap();
            (
                eth_frame.dst_addr(),
                eth_frame.payload_type(),
                eth_frame.payload().to_vec(),
            )
        })
        .collect()
}
