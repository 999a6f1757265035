use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::check::internet_checksum;
use crate::{
    Error,
    Result,
};

/// [https://www.iana.org/assignments/icmp-parameters/icmp-parameters.xhtml](https://www.iana.org/assignments/icmp-parameters/icmp-parameters.xhtml)
pub mod types {
    pub const ECHO_REPLY: u8 = 0;

    pub const ECHO_REQUEST: u8 = 8;
}

/// Safe representation of an ICMP echo header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repr {
    EchoReply { id: u16, seq: u16 },
    EchoRequest { id: u16, seq: u16 },
}

impl Repr {
    /// Returns the ICMP header size needed to serialize this ICMP
    /// representation.
    pub fn buffer_len(&self) -> usize {
        Packet::<&[u8]>::HEADER_LEN
    }

    /// Tries to deserialize a packet into an ICMP representation.
    pub fn deserialize<T>(packet: &Packet<T>) -> Result<Repr>
    where
        T: AsRef<[u8]>,
    {
        match (packet._type(), packet.code()) {
            (types::ECHO_REPLY, 0) => Ok(Repr::EchoReply {
                id: packet.echo_id(),
                seq: packet.echo_seq(),
            }),
            (types::ECHO_REQUEST, 0) => Ok(Repr::EchoRequest {
                id: packet.echo_id(),
                seq: packet.echo_seq(),
            }),
            _ => Err(Error::Unsupported),
        }
    }

    /// Serializes the ICMP header into a packet.
    ///
    /// The checksum covers the payload, so the payload should be written
    /// before serializing the header.
    pub fn serialize<T>(&self, packet: &mut Packet<T>)
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        let (type_of, id, seq) = match *self {
            Repr::EchoReply { id, seq } => (types::ECHO_REPLY, id, seq),
            Repr::EchoRequest { id, seq } => (types::ECHO_REQUEST, id, seq),
        };

        packet.set_type(type_of);
        packet.set_code(0);
        packet.set_echo_id(id);
        packet.set_echo_seq(seq);
        packet.fill_checksum();
    }
}

/// [https://en.wikipedia.org/wiki/Internet_Control_Message_Protocol](https://en.wikipedia.org/wiki/Internet_Control_Message_Protocol)
mod fields {
    use std::ops::{
        Range,
        RangeFrom,
    };

    pub const TYPE: usize = 0;

    pub const CODE: usize = 1;

    pub const CHECKSUM: Range<usize> = 2 .. 4;

    pub const ECHO_ID: Range<usize> = 4 .. 6;

    pub const ECHO_SEQ: Range<usize> = 6 .. 8;

    pub const PAYLOAD: RangeFrom<usize> = 8 ..;
}

/// View of a byte buffer as an ICMP packet.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const HEADER_LEN: usize = 8;

    pub const MAX_PACKET_LEN: usize = 65535;

    /// Tries to create an ICMP packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::HEADER_LEN || buffer.as_ref().len() > Self::MAX_PACKET_LEN
        {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of an ICMP packet with the specified payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    /// Checks if the packet has a valid checksum.
    pub fn check_encoding(&self) -> Result<()> {
        if self.gen_packet_checksum() != 0 {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    /// Calculates the checksum over the whole message.
    pub fn gen_packet_checksum(&self) -> u16 {
        internet_checksum(self.buffer.as_ref())
    }

    pub fn _type(&self) -> u8 {
        self.buffer.as_ref()[fields::TYPE]
    }

    pub fn code(&self) -> u8 {
        self.buffer.as_ref()[fields::CODE]
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::CHECKSUM])
    }

    pub fn echo_id(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::ECHO_ID])
    }

    pub fn echo_seq(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::ECHO_SEQ])
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_type(&mut self, type_of: u8) {
        self.buffer.as_mut()[fields::TYPE] = type_of;
    }

    pub fn set_code(&mut self, code: u8) {
        self.buffer.as_mut()[fields::CODE] = code;
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::CHECKSUM], checksum);
    }

    pub fn set_echo_id(&mut self, id: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::ECHO_ID], id);
    }

    pub fn set_echo_seq(&mut self, seq: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::ECHO_SEQ], seq);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[fields::PAYLOAD]
    }

    /// Computes the checksum with the checksum field zeroed and writes it in
    /// network byte order.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = self.gen_packet_checksum();
        self.set_checksum(checksum);
    }
}
