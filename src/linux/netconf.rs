use std::fs;

use get_if_addrs::{
    self,
    IfAddr,
};

use crate::core::config::NetConf;
use crate::core::repr::Ipv4Address;
use crate::linux::libc as _libc;
use crate::{
    Error,
    Result,
};

const ROUTE_TABLE: &str = "/proc/net/route";

/// Interface configuration queried from the operating system.
#[derive(Clone, Debug)]
pub struct SystemNetConf {
    ifr_name: String,
}

impl SystemNetConf {
    /// Creates a configuration source for the named interface.
    pub fn new(ifr_name: &str) -> SystemNetConf {
        SystemNetConf {
            ifr_name: ifr_name.to_string(),
        }
    }

    fn ifv4_addr(&self) -> Result<get_if_addrs::Ifv4Addr> {
        for interface in get_if_addrs::get_if_addrs()? {
            if interface.name != self.ifr_name {
                continue;
            }
            if let IfAddr::V4(ifv4_addr) = interface.addr {
                return Ok(ifv4_addr);
            }
        }

        Err(Error::Config("no IPv4 address on interface"))
    }
}

impl NetConf for SystemNetConf {
    fn ipv4_addr(&self) -> Result<Ipv4Address> {
        Ok(Ipv4Address::from(self.ifv4_addr()?.ip))
    }

    fn netmask(&self) -> Result<Ipv4Address> {
        Ok(Ipv4Address::from(self.ifv4_addr()?.netmask))
    }

    fn default_gateway(&self) -> Result<Ipv4Address> {
        let routes = fs::read_to_string(ROUTE_TABLE)?;
        parse_default_gateway(&routes, &self.ifr_name)
            .ok_or(Error::Config("no default gateway for interface"))
    }

    fn max_transmission_unit(&self) -> Result<usize> {
        let mut ifreq = _libc::c_ifreq::with_name(&self.ifr_name)?;
        _libc::inet_ioctl(_libc::SIOCGIFMTU, &mut ifreq)?;
        let mtu = unsafe { ifreq.ifr_ifru.ifr_mtu };
        if mtu <= 0 {
            return Err(Error::Config("invalid MTU"));
        }
        Ok(mtu as usize)
    }
}

/// Finds the gateway of the default route through an interface in the
/// contents of /proc/net/route.
///
/// Addresses in the table are hex encoded in host byte order.
fn parse_default_gateway(routes: &str, ifr_name: &str) -> Option<Ipv4Address> {
    routes.lines().skip(1).find_map(|line| {
        let fields: Vec<_> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[0] != ifr_name || fields[1] != "00000000" {
            return None;
        }
        u32::from_str_radix(fields[2], 16)
            .ok()
            .map(|gateway| Ipv4Address::new(gateway.to_ne_bytes()))
    })
}
