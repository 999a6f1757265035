#[cfg(test)]
#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate log;

pub mod core;

#[cfg(target_os = "linux")]
pub mod linux;

use std::fmt::{
    Display,
    Formatter,
    Result as FmtResult,
};

use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
};

#[derive(Debug)]
pub enum Error {
    /// Indicates an error where an IPv4 address could not be resolved to an
    /// Ethernet address.
    MacResolution(Ipv4Address),
    /// Indicates an error where a buffer, device, etc. is full or empty.
    Exhausted,
    /// Indicates an error where a packet or frame is malformed.
    Malformed,
    /// Indicates an error where a checksum is invalid.
    Checksum,
    /// Indicates a packet or frame was ignored.
    Ignored,
    /// Indicates another host answered for our own IPv4 address.
    DuplicateAddress(Ipv4Address, EthernetAddress),
    /// Indicates an operation or message type that is not supported.
    Unsupported,
    /// Indicates an echo reply with no matching echo request.
    UnknownEcho,
    /// Indicates a resource, such as a port, is already in use.
    InUse,
    /// Indicates a missing or invalid piece of interface configuration.
    Config(&'static str),
    /// Indicates a generic IO error.
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match *self {
            Error::MacResolution(addr) => write!(f, "unable to resolve {}", addr),
            Error::Exhausted => write!(f, "buffer or device exhausted"),
            Error::Malformed => write!(f, "malformed packet"),
            Error::Checksum => write!(f, "invalid checksum"),
            Error::Ignored => write!(f, "packet ignored"),
            Error::DuplicateAddress(ipv4_addr, eth_addr) => {
                write!(f, "{} is already in use by {}", ipv4_addr, eth_addr)
            }
            Error::Unsupported => write!(f, "unsupported operation"),
            Error::UnknownEcho => write!(f, "echo reply without a matching request"),
            Error::InUse => write!(f, "resource in use"),
            Error::Config(what) => write!(f, "interface configuration: {}", what),
            Error::IO(ref err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
