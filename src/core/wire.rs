//! An in-memory Ethernet segment for connecting stacks without a device.

use std::sync::mpsc::{
    channel,
    Receiver,
    RecvTimeoutError,
    Sender,
};
use std::sync::{
    Arc,
    Mutex,
};
use std::time::Duration;

use crate::core::link::Link;
use crate::core::repr::{
    EthernetAddress,
    EthernetFrame,
};
use crate::{
    Error,
    Result,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Attachment {
    eth_addr: EthernetAddress,
    sender: Sender<Vec<u8>>,
}

/// A shared Ethernet segment that ports can be attached to.
#[derive(Clone, Debug, Default)]
pub struct Wire {
    attachments: Arc<Mutex<Vec<Attachment>>>,
}

impl Wire {
    pub fn new() -> Wire {
        Wire::default()
    }

    /// Attaches a new port with the specified hardware address.
    pub fn attach(&self, eth_addr: EthernetAddress) -> Port {
        let (sender, receiver) = channel();
        self.attachments
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(Attachment { eth_addr, sender });

        Port {
            eth_addr,
            wire: self.clone(),
            receiver: Mutex::new(receiver),
            sent_frames: Mutex::new(Vec::new()),
        }
    }

    fn transmit(&self, frame: &[u8], src_addr: EthernetAddress, dst_addr: EthernetAddress) {
        let attachments = self.attachments.lock().unwrap_or_else(|err| err.into_inner());
        for attachment in attachments.iter() {
            if attachment.eth_addr == src_addr {
                continue;
            }
            if dst_addr.is_broadcast() || attachment.eth_addr == dst_addr {
                // A port that was dropped simply stops receiving.
                let _ = attachment.sender.send(frame.to_vec());
            }
        }
    }
}

/// A link attached to a wire.
#[derive(Debug)]
pub struct Port {
    eth_addr: EthernetAddress,
    wire: Wire,
    receiver: Mutex<Receiver<Vec<u8>>>,
    sent_frames: Mutex<Vec<Vec<u8>>>,
}

impl Port {
    /// Returns every Ethernet frame sent through this port so far.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent_frames
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Forgets the frames sent so far.
    pub fn clear_sent_frames(&self) {
        self.sent_frames
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
    }
}

impl Link for Port {
    fn send_frame(&self, payload: &[u8], eth_type: u16, dst_addr: EthernetAddress) -> Result<()> {
        let mut buffer = vec![0; EthernetFrame::<&[u8]>::buffer_len(payload.len())];
        {
            let mut eth_frame = EthernetFrame::try_new(&mut buffer[..])?;
            eth_frame.set_dst_addr(dst_addr);
            eth_frame.set_src_addr(self.eth_addr);
            eth_frame.set_payload_type(eth_type);
            eth_frame.payload_mut().copy_from_slice(payload);
        }

        self.sent_frames
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(buffer.clone());
        self.wire.transmit(&buffer, self.eth_addr, dst_addr);

        Ok(())
    }

    fn recv_frame(&self, buffer: &mut [u8]) -> Result<usize> {
        let frame = {
            let receiver = self.receiver.lock().unwrap_or_else(|err| err.into_inner());
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Exhausted);
                }
            }
        };

        if frame.len() > buffer.len() {
            return Err(Error::Exhausted);
        }

        buffer[.. frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    fn ethernet_addr(&self) -> EthernetAddress {
        self.eth_addr
    }
}
