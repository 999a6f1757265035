use std::collections::HashMap;
use std::sync::mpsc::{
    channel,
    Receiver,
    Sender,
};
use std::sync::{
    Mutex,
    MutexGuard,
};
use std::time::{
    Duration,
    Instant,
};

use crate::core::link::FrameMeta;
use crate::core::repr::{
    icmpv4_types,
    ipv4_protocols,
    Icmpv4Packet,
    Icmpv4Repr,
    Ipv4Address,
};
use crate::core::service::ipv4::{
    Ipv4Service,
    ProtocolHandler,
};
use crate::{
    Error,
    Result,
};

/// An echo reply matched with the request that prompted it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pong {
    pub src_addr: Ipv4Address,
    pub id: u16,
    pub seq: u16,
    /// Time from sending the request to capturing the reply.
    pub rtt: Duration,
}

/// How long send times of unanswered echo requests are kept by default.
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_secs(60);

/// Answers echo requests and measures round trip times of echo replies.
#[derive(Debug)]
pub struct Icmpv4Service {
    echo_timeout: Duration,
    send_times: Mutex<HashMap<(Ipv4Address, u16, u16), Instant>>,
    subscribers: Mutex<Vec<Sender<Pong>>>,
}

impl Default for Icmpv4Service {
    fn default() -> Icmpv4Service {
        Icmpv4Service::new()
    }
}

impl Icmpv4Service {
    pub fn new() -> Icmpv4Service {
        Icmpv4Service::with_echo_timeout(DEFAULT_ECHO_TIMEOUT)
    }

    /// Creates a service forgetting echo requests that are unanswered after
    /// echo_timeout.
    pub fn with_echo_timeout(echo_timeout: Duration) -> Icmpv4Service {
        Icmpv4Service {
            echo_timeout,
            send_times: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Sends an echo request, recording the send time for the reply.
    pub fn send_echo_request(
        &self,
        ipv4: &Ipv4Service,
        dst_addr: Ipv4Address,
        id: u16,
        seq: u16,
        payload: &[u8],
    ) -> Result<()> {
        self.send_message(ipv4, dst_addr, icmpv4_types::ECHO_REQUEST, 0, id, seq, payload)
    }

    /// Sends an ICMP echo message.
    ///
    /// Only echo requests and replies can be sent, other types fail with
    /// Error::Unsupported.
    pub fn send_message(
        &self,
        ipv4: &Ipv4Service,
        dst_addr: Ipv4Address,
        type_of: u8,
        code: u8,
        id: u16,
        seq: u16,
        payload: &[u8],
    ) -> Result<()> {
        let buffer = build_message(type_of, code, id, seq, payload)?;

        let is_request = type_of == icmpv4_types::ECHO_REQUEST;
        if is_request {
            self.record_send_time((dst_addr, id, seq));
        }

        debug!(
            "Sending ICMP type {} id {} seq {} to {}.",
            type_of, id, seq, dst_addr
        );

        let sent = ipv4.send(dst_addr, &buffer, ipv4_protocols::ICMP);
        if sent.is_err() && is_request {
            self.lock_send_times().remove(&(dst_addr, id, seq));
        }
        sent
    }

    /// Removes and returns the send time of the echo request to src_addr with
    /// the id and sequence number.
    ///
    /// Fails with Error::UnknownEcho if no such request was sent.
    pub fn take_send_time(&self, src_addr: Ipv4Address, id: u16, seq: u16) -> Result<Instant> {
        self.lock_send_times()
            .remove(&(src_addr, id, seq))
            .ok_or(Error::UnknownEcho)
    }

    /// Returns a channel receiving every matched echo reply from now on.
    pub fn subscribe(&self) -> Receiver<Pong> {
        let (sender, receiver) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(sender);
        receiver
    }

    fn recv_message(
        &self,
        ipv4: &Ipv4Service,
        meta: &FrameMeta,
        buffer: &[u8],
        src_addr: Ipv4Address,
    ) -> Result<()> {
        let icmp_packet = Icmpv4Packet::try_new(buffer)?;
        icmp_packet.check_encoding()?;

        debug!(
            "Received ICMP type {} code {} from {}.",
            icmp_packet._type(),
            icmp_packet.code(),
            src_addr
        );

        match Icmpv4Repr::deserialize(&icmp_packet) {
            Ok(Icmpv4Repr::EchoRequest { id, seq }) => {
                debug!("Got a ping from {}; Sending response...", src_addr);
                let reply = build_message(
                    icmpv4_types::ECHO_REPLY,
                    icmp_packet.code(),
                    id,
                    seq,
                    icmp_packet.payload(),
                )?;
                // Resolving the requester may need ARP frames this thread
                // has yet to process.
                ipv4.send_deferred(src_addr, reply, ipv4_protocols::ICMP)
            }
            Ok(Icmpv4Repr::EchoReply { id, seq }) => {
                let send_time = self.take_send_time(src_addr, id, seq)?;
                let rtt = meta.timestamp.saturating_duration_since(send_time);
                info!(
                    "Echo reply from {} id {} seq {} with RTT {:?}.",
                    src_addr, id, seq, rtt
                );
                self.publish(Pong {
                    src_addr,
                    id,
                    seq,
                    rtt,
                });
                Ok(())
            }
            Err(Error::Unsupported) => Err(Error::Ignored),
            Err(err) => Err(err),
        }
    }

    fn publish(&self, pong: Pong) {
        self.subscribers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .retain(|subscriber| subscriber.send(pong).is_ok());
    }

    /// Records the send time of a request, forgetting requests that went
    /// unanswered for longer than the echo timeout.
    fn record_send_time(&self, key: (Ipv4Address, u16, u16)) {
        let now = Instant::now();
        let echo_timeout = self.echo_timeout;
        let mut send_times = self.lock_send_times();
        send_times.retain(|_, sent| now.saturating_duration_since(*sent) < echo_timeout);
        send_times.insert(key, now);
    }

    fn lock_send_times(&self) -> MutexGuard<HashMap<(Ipv4Address, u16, u16), Instant>> {
        self.send_times.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Builds an echo message with the checksum filled in.
///
/// Only echo requests and replies can be built, other types fail with
/// Error::Unsupported.
fn build_message(type_of: u8, code: u8, id: u16, seq: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let icmp_repr = match type_of {
        icmpv4_types::ECHO_REQUEST => Icmpv4Repr::EchoRequest { id, seq },
        icmpv4_types::ECHO_REPLY => Icmpv4Repr::EchoReply { id, seq },
        _ => return Err(Error::Unsupported),
    };

    let mut buffer = vec![0; icmp_repr.buffer_len() + payload.len()];
    {
        let mut icmp_packet = Icmpv4Packet::try_new(&mut buffer[..])?;
        icmp_packet.payload_mut().copy_from_slice(payload);
        icmp_repr.serialize(&mut icmp_packet);
        if code != 0 {
            icmp_packet.set_code(code);
            icmp_packet.fill_checksum();
        }
    }

    Ok(buffer)
}

impl ProtocolHandler for Icmpv4Service {
    fn recv_packet(
        &self,
        ipv4: &Ipv4Service,
        meta: &FrameMeta,
        payload: &[u8],
        src_addr: Ipv4Address,
    ) {
        match self.recv_message(ipv4, meta, payload, src_addr) {
            Ok(_) | Err(Error::Ignored) => {}
            Err(Error::UnknownEcho) => warn!("Echo reply from {} matches no request.", src_addr),
            Err(err) => debug!("Dropping ICMP packet from {} with {:?}.", src_addr, err),
        }
    }
}
