use std::io;

use crate::core::link::Link;
use crate::core::repr::{
    EthernetAddress,
    EthernetFrame,
};
use crate::linux::libc as _libc;
use crate::{
    Error,
    Result,
};

/// How long recv_frame(...) waits for a frame before giving up.
const POLL_TIMEOUT_MS: libc::c_int = 10;

/// [TAP interface](https://www.kernel.org/doc/Documentation/networking/tuntap.txt)
/// for sending and receiving raw ethernet frames.
#[derive(Debug)]
pub struct Tap {
    fd: libc::c_int,
    eth_addr: EthernetAddress,
}

impl Tap {
    /// Creates or binds to an existing TAP interface with the specified name,
    /// sending frames from eth_addr.
    pub fn new(ifr_name: &str, eth_addr: EthernetAddress) -> Result<Tap> {
        let mut ifreq = _libc::c_ifreq::with_name(ifr_name)?;

        unsafe {
            let fd = libc::open(
                "/dev/net/tun\0".as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK,
            );

            if fd == -1 {
                return Err(Error::IO(io::Error::last_os_error()));
            }

            ifreq.ifr_ifru.ifr_flags = _libc::IFF_TAP | _libc::IFF_NO_PI;
            if libc::ioctl(fd, _libc::TUNSETIFF as _, &mut ifreq as *mut _libc::c_ifreq) == -1 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(Error::IO(err));
            }

            info!("Opened TAP {} for {}.", ifr_name, eth_addr);

            Ok(Tap { fd, eth_addr })
        }
    }
}

impl Link for Tap {
    fn send_frame(&self, payload: &[u8], eth_type: u16, dst_addr: EthernetAddress) -> Result<()> {
        let mut buffer = vec![0; EthernetFrame::<&[u8]>::buffer_len(payload.len())];
        {
            let mut eth_frame = EthernetFrame::try_new(&mut buffer[..])?;
            eth_frame.set_dst_addr(dst_addr);
            eth_frame.set_src_addr(self.eth_addr);
            eth_frame.set_payload_type(eth_type);
            eth_frame.payload_mut().copy_from_slice(payload);
        }

        unsafe {
            let wrote = libc::write(
                self.fd,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len(),
            );

            if wrote < 0 && _libc::errno() == libc::EAGAIN {
                Err(Error::Exhausted)
            } else if wrote < 0 {
                Err(Error::IO(io::Error::last_os_error()))
            } else {
                Ok(())
            }
        }
    }

    fn recv_frame(&self, buffer: &mut [u8]) -> Result<usize> {
        unsafe {
            let mut pollfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };

            let ready = libc::poll(&mut pollfd as *mut libc::pollfd, 1, POLL_TIMEOUT_MS);
            if ready == 0 || (ready < 0 && _libc::errno() == libc::EINTR) {
                return Err(Error::Exhausted);
            } else if ready < 0 {
                return Err(Error::IO(io::Error::last_os_error()));
            }

            let read = libc::read(
                self.fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
            );

            if read < 0 && _libc::errno() == libc::EAGAIN {
                Err(Error::Exhausted)
            } else if read < 0 {
                Err(Error::IO(io::Error::last_os_error()))
            } else {
                Ok(read as usize)
            }
        }
    }

    fn ethernet_addr(&self) -> EthernetAddress {
        self.eth_addr
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
