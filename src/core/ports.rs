//! Allocation of local port numbers.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::{
    Arc,
    Mutex,
};

use rand::Rng;

use crate::{
    Error,
    Result,
};

/// First port of the [ephemeral range](https://tools.ietf.org/html/rfc6335#section-6).
pub const EPHEMERAL_START: u16 = 49152;

/// A port which has been reserved, and is freed for reallocation by the
/// owning Ports instance once dropped.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    ports: Arc<Mutex<HashSet<u16>>>,
}

impl Deref for PortLease {
    type Target = u16;

    fn deref(&self) -> &u16 {
        &self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.ports
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&self.port);
    }
}

/// An allocator for port leases.
#[derive(Debug, Default)]
pub struct Ports {
    ports: Arc<Mutex<HashSet<u16>>>,
}

impl Ports {
    pub fn new() -> Ports {
        Ports::default()
    }

    /// Tries to reserve the specified port, returning an Error::InUse if the
    /// port is already in use.
    pub fn bind(&self, port: u16) -> Result<PortLease> {
        if self
            .ports
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(port)
        {
            Ok(PortLease {
                port,
                ports: self.ports.clone(),
            })
        } else {
            Err(Error::InUse)
        }
    }

    /// Reserves a free port from the ephemeral range, starting the search at a
    /// random port. Returns Error::InUse if every ephemeral port is leased.
    pub fn bind_ephemeral(&self) -> Result<PortLease> {
        let range = (u16::max_value() - EPHEMERAL_START) as u32 + 1;
        let start = rand::thread_rng().gen_range(0, range);

        for i in 0 .. range {
            let port = EPHEMERAL_START + ((start + i) % range) as u16;
            match self.bind(port) {
                Ok(lease) => return Ok(lease),
                Err(Error::InUse) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(Error::InUse)
    }
}
