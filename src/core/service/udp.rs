use std::sync::mpsc::{
    channel,
    Receiver,
    Sender,
};
use std::sync::Mutex;

use crate::core::link::FrameMeta;
use crate::core::ports::Ports;
use crate::core::repr::{
    ipv4_protocols,
    Ipv4Address,
    UdpPacket,
    UdpRepr,
};
use crate::core::service::ipv4::{
    Ipv4Service,
    ProtocolHandler,
};
use crate::{
    Error,
    Result,
};

/// A received UDP datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_addr: Ipv4Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

/// Sends UDP datagrams from ephemeral ports and reports received ones.
#[derive(Debug, Default)]
pub struct UdpService {
    ports: Ports,
    subscribers: Mutex<Vec<Sender<UdpDatagram>>>,
}

impl UdpService {
    pub fn new() -> UdpService {
        UdpService::default()
    }

    /// Sends a payload to dst_addr:dst_port and returns the source port used.
    ///
    /// The source port is leased from the ephemeral range for the duration
    /// of the send. The checksum is left at 0.
    pub fn send(
        &self,
        ipv4: &Ipv4Service,
        dst_addr: Ipv4Address,
        dst_port: u16,
        payload: &[u8],
    ) -> Result<u16> {
        let buffer_len = UdpPacket::<&[u8]>::buffer_len(payload.len());
        if buffer_len > UdpPacket::<&[u8]>::MAX_PACKET_LEN {
            return Err(Error::Exhausted);
        }

        let src_port = self.ports.bind_ephemeral()?;
        let udp_repr = UdpRepr {
            src_port: *src_port,
            dst_port,
            length: buffer_len as u16,
        };

        let mut buffer = vec![0; buffer_len];
        {
            let mut udp_packet = UdpPacket::try_new(&mut buffer[..])?;
            udp_repr.serialize(&mut udp_packet);
            udp_packet.payload_mut().copy_from_slice(payload);
        }

        debug!(
            "Sending UDP datagram from port {} to {}:{}.",
            *src_port, dst_addr, dst_port
        );
        ipv4.send(dst_addr, &buffer, ipv4_protocols::UDP)?;

        Ok(*src_port)
    }

    /// Returns a channel receiving every UDP datagram received from now on.
    pub fn subscribe(&self) -> Receiver<UdpDatagram> {
        let (sender, receiver) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(sender);
        receiver
    }

    fn recv_datagram(&self, buffer: &[u8], src_addr: Ipv4Address) -> Result<()> {
        let udp_packet = UdpPacket::try_new(buffer)?;
        let udp_repr = UdpRepr::deserialize(&udp_packet)?;

        let datagram = UdpDatagram {
            src_addr,
            src_port: udp_repr.src_port,
            dst_port: udp_repr.dst_port,
            payload: udp_packet.payload().to_vec(),
        };

        debug!(
            "Received UDP datagram from {}:{} to port {} with {} byte(s).",
            datagram.src_addr,
            datagram.src_port,
            datagram.dst_port,
            datagram.payload.len()
        );

        self.subscribers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .retain(|subscriber| subscriber.send(datagram.clone()).is_ok());

        Ok(())
    }
}

impl ProtocolHandler for UdpService {
    fn recv_packet(&self, _: &Ipv4Service, _: &FrameMeta, payload: &[u8], src_addr: Ipv4Address) {
        if let Err(err) = self.recv_datagram(payload, src_addr) {
            debug!("Dropping UDP datagram from {} with {:?}.", src_addr, err);
        }
    }
}
