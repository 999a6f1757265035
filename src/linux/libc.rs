use std::io;

use crate::{
    Error,
    Result,
};

pub const IFF_TAP: libc::c_short = 0x0002;

pub const IFF_NO_PI: libc::c_short = 0x1000;

pub const TUNSETIFF: libc::c_ulong = 0x400454CA;

pub const SIOCGIFMTU: libc::c_ulong = 0x8921;

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy)]
pub union c_ifr_ifru {
    pub ifr_flags: libc::c_short,
    pub ifr_mtu: libc::c_int,
    _pad: [u8; 24],
}

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy)]
/// [https://linux.die.net/man/7/netdevice](https://linux.die.net/man/7/netdevice)
pub struct c_ifreq {
    pub ifr_name: [libc::c_char; libc::IF_NAMESIZE],
    pub ifr_ifru: c_ifr_ifru,
}

impl c_ifreq {
    /// Creates a request for the named interface with the data zeroed.
    pub fn with_name(ifr_name: &str) -> Result<c_ifreq> {
        // Room for the NUL terminator.
        if ifr_name.is_empty() || ifr_name.len() >= libc::IF_NAMESIZE {
            return Err(Error::Config("invalid interface name"));
        }

        let mut ifreq = c_ifreq {
            ifr_name: [0; libc::IF_NAMESIZE],
            ifr_ifru: c_ifr_ifru { _pad: [0; 24] },
        };

        for (i, c) in ifr_name.as_bytes().iter().enumerate() {
            ifreq.ifr_name[i] = *c as libc::c_char;
        }

        Ok(ifreq)
    }
}

/// Returns the errno of the last failed call.
pub fn errno() -> libc::c_int {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Issues an interface ioctl on a throwaway AF_INET socket.
pub fn inet_ioctl(request: libc::c_ulong, ifreq: &mut c_ifreq) -> Result<()> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);

        if fd == -1 {
            return Err(Error::IO(io::Error::last_os_error()));
        }

        if libc::ioctl(fd, request as _, ifreq as *mut c_ifreq) == -1 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(Error::IO(err));
        }

        libc::close(fd);
        Ok(())
    }
}
