use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::{
    Error,
    Result,
};

/// Safe representation of a UDP header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

impl Repr {
    /// Returns the UDP packet size needed to serialize this UDP header and
    /// payload.
    pub fn buffer_len(&self) -> usize {
        self.length as usize
    }

    /// Tries to deserialize a packet into a UDP header.
    pub fn deserialize<T>(packet: &Packet<T>) -> Result<Repr>
    where
        T: AsRef<[u8]>,
    {
        if (packet.length() as usize) < Packet::<&[u8]>::HEADER_LEN {
            return Err(Error::Malformed);
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            length: packet.length(),
        })
    }

    /// Serializes the UDP header into a packet.
    ///
    /// The checksum is left at 0, meaning "not computed".
    pub fn serialize<T>(&self, packet: &mut Packet<T>)
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_length(self.length);
        packet.set_checksum(0);
    }
}

/// [https://en.wikipedia.org/wiki/User_Datagram_Protocol](https://en.wikipedia.org/wiki/User_Datagram_Protocol)
mod fields {
    use std::ops::Range;

    pub const SRC_PORT: Range<usize> = 0 .. 2;

    pub const DST_PORT: Range<usize> = 2 .. 4;

    pub const LENGTH: Range<usize> = 4 .. 6;

    pub const CHECKSUM: Range<usize> = 6 .. 8;
}

/// View of a byte buffer as a UDP packet.
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

    /// Tries to create a UDP packet view over a byte buffer.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        let buffer_len = buffer.as_ref().len();

        if buffer_len < Self::HEADER_LEN || buffer_len > Self::MAX_PACKET_LEN {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Returns the length of a UDP packet with the specified payload size.
    pub fn buffer_len(payload_len: usize) -> usize {
        Self::HEADER_LEN + payload_len
    }

    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::SRC_PORT])
    }

    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::DST_PORT])
    }

    pub fn length(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::LENGTH])
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::CHECKSUM])
    }

    /// Returns the payload, bounded by the length field when it is
    /// consistent with the buffer.
    pub fn payload(&self) -> &[u8] {
        let buffer = self.buffer.as_ref();
        let end = (self.length() as usize).max(Self::HEADER_LEN).min(buffer.len());
        &buffer[Self::HEADER_LEN .. end]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_src_port(&mut self, port: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::SRC_PORT], port);
    }

    pub fn set_dst_port(&mut self, port: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::DST_PORT], port);
    }

    pub fn set_length(&mut self, length: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::LENGTH], length);
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::CHECKSUM], checksum);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[Self::HEADER_LEN ..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_with_buffer_less_than_min_header() {
        let buffer: [u8; 4] = [0; 4];
        let packet = Packet::try_new(&buffer[..]);
        assert_matches!(packet, Err(Error::Exhausted));
    }

    #[test]
    fn test_packet_getters() {
        let buffer: [u8; 16] = [
            0x04, 0x00, 0x08, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x09, 0x08, 0x07, 0x06, 0x00, 0x00,
            0x00, 0x00,
        ];

        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_eq!(1024, packet.src_port());
        assert_eq!(2048, packet.dst_port());
        assert_eq!(12, packet.length());
        assert_eq!(0, packet.checksum());
        assert_eq!(&[9, 8, 7, 6], packet.payload());
    }

    #[test]
    fn test_serialize() {
        let mut buffer: [u8; 12] = [0xFF; 12];

        {
            let mut packet = Packet::try_new(&mut buffer[..]).unwrap();
            packet.payload_mut().copy_from_slice(b"abcd");
            Repr {
                src_port: 1024,
                dst_port: 2048,
                length: 12,
            }.serialize(&mut packet);
        }

        assert_eq!(
            &buffer[..],
            &[0x04, 0x00, 0x08, 0x00, 0x00, 0x0C, 0x00, 0x00, b'a', b'b', b'c', b'd'][..]
        );
    }

    #[test]
    fn test_deserialize_with_short_length() {
        let buffer: [u8; 8] = [0x04, 0x00, 0x08, 0x00, 0x00, 0x04, 0x00, 0x00];
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(Repr::deserialize(&packet), Err(Error::Malformed));
    }
}
