use std::sync::Arc;

use usrip::core::config::{
    NetConf,
    StackConfig,
    StaticNetConf,
};
use usrip::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use usrip::core::service::Stack;

pub trait App {
    fn with_defaults(self) -> Self;
}

impl<'a, 'b> App for clap::App<'a, 'b> {
    fn with_defaults(self) -> Self {
        self.arg(
            clap::Arg::with_name("tap")
                .long("tap")
                .value_name("TAP")
                .help("Linux TAP interface")
                .default_value("tap0")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("dev-mac")
                .long("dev-mac")
                .value_name("MAC")
                .help("MAC address of the device")
                .default_value("06:11:22:33:44:55")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("dev-ipv4")
                .long("dev-ipv4")
                .value_name("IPV4")
                .help("IPv4 address of the device")
                .default_value("10.0.0.102")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("netmask")
                .long("netmask")
                .value_name("IPV4")
                .help("Subnet mask of the device")
                .default_value("255.255.255.0")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("gateway")
                .long("gateway")
                .value_name("IPV4")
                .help("Default gateway, the TAP's own address by default")
                .takes_value(true),
        )
    }
}

/// Parses an IPv4 address argument, exiting with a usage error if invalid.
pub fn ipv4_arg(matches: &clap::ArgMatches, name: &str) -> Ipv4Address {
    let value = matches.value_of(name).unwrap_or_default();
    value.parse().unwrap_or_else(|_| {
        clap::Error::value_validation_auto(format!("Bad IPv4 address '{}' for {}", value, name))
            .exit()
    })
}

#[cfg(target_os = "linux")]
mod platform {
    use super::*;
    use usrip::linux::netconf::SystemNetConf;
    use usrip::linux::tap::Tap;

    /// Brings up a stack on the TAP interface described by the arguments.
    pub fn stack(matches: &clap::ArgMatches) -> usrip::Result<Stack> {
        let ifr_name = matches.value_of("tap").unwrap_or("tap0");
        let eth_addr: EthernetAddress = matches
            .value_of("dev-mac")
            .unwrap_or_default()
            .parse()
            .expect("Bad MAC address!");

        let system = SystemNetConf::new(ifr_name);
        let default_gateway = match matches.value_of("gateway") {
            Some(_) => ipv4_arg(matches, "gateway"),
            None => system.ipv4_addr()?,
        };

        let netconf = StaticNetConf {
            ipv4_addr: ipv4_arg(matches, "dev-ipv4"),
            netmask: ipv4_arg(matches, "netmask"),
            default_gateway,
            mtu: system.max_transmission_unit()?,
        };

        println!(
            "Interface: (MTU = {}, MAC = {}, IPv4 = {}, Gateway: {})",
            netconf.mtu, eth_addr, netconf.ipv4_addr, netconf.default_gateway,
        );

        let link = Arc::new(Tap::new(ifr_name, eth_addr)?);
        Stack::new(link, &netconf, StackConfig::default())
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use super::*;

    pub fn stack(_: &clap::ArgMatches) -> usrip::Result<Stack> {
        panic!("Sorry, demos are only supported on Linux.");
    }
}

pub use self::platform::stack;

/// Prints the ARP cache of a stack.
pub fn print_arp_cache(stack: &Stack) {
    println!("ARP cache:");
    for (ipv4_addr, eth_addr) in stack.arp().cache_entries() {
        println!("  {:15} -> {}", ipv4_addr.to_string(), eth_addr);
    }
}
