use std::fmt::{
    Display,
    Formatter,
    Result as FmtResult,
};
use std::net::Ipv4Addr as StdIpv4Addr;
use std::result::Result as StdResult;
use std::str::FromStr;

use byteorder::{
    ByteOrder,
    NetworkEndian,
};

use crate::core::check::internet_checksum;
use crate::{
    Error,
    Result,
};

/// [IPv4 address](https://en.wikipedia.org/wiki/IPv4) in network byte order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 4]);

impl Address {
    pub const UNSPECIFIED: Address = Address([0; 4]);

    /// Creates an IPv4 address from a network byte order buffer.
    pub fn new(addr: [u8; 4]) -> Address {
        Address(addr)
    }

    /// Tries to create an IPv4 address from a network byte order slice.
    pub fn try_new(addr: &[u8]) -> Result<Address> {
        if addr.len() != 4 {
            return Err(Error::Exhausted);
        }

        let mut _addr: [u8; 4] = [0; 4];
        _addr.clone_from_slice(addr);
        Ok(Address(_addr))
    }

    /// Returns a reference to the network byte order representation of the address.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the address as a host order integer.
    pub fn as_u32(&self) -> u32 {
        NetworkEndian::read_u32(&self.0)
    }

    /// Returns the address with only the bits set in the mask kept.
    pub fn mask(&self, netmask: Address) -> Address {
        Address::from(self.as_u32() & netmask.as_u32())
    }

    /// Checks if the address is on the same subnet as another address.
    pub fn is_same_subnet(&self, other: Address, netmask: Address) -> bool {
        self.mask(netmask) == other.mask(netmask)
    }
}

impl From<u32> for Address {
    fn from(addr: u32) -> Address {
        let mut bytes = [0; 4];
        NetworkEndian::write_u32(&mut bytes, addr);
        Address(bytes)
    }
}

impl From<StdIpv4Addr> for Address {
    fn from(addr: StdIpv4Addr) -> Address {
        Address(addr.octets())
    }
}

impl From<Address> for StdIpv4Addr {
    fn from(addr: Address) -> StdIpv4Addr {
        StdIpv4Addr::from(addr.0)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl FromStr for Address {
    type Err = ();

    /// Parses an IPv4 address from an A.B.C.D style string.
    fn from_str(addr: &str) -> StdResult<Address, Self::Err> {
        addr.parse::<StdIpv4Addr>()
            .map(Address::from)
            .map_err(|_| ())
    }
}

/// [https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml](https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml)
pub mod protocols {
    pub const ICMP: u8 = 1;

    pub const TCP: u8 = 6;

    pub const UDP: u8 = 17;
}

/// Bits of the 16 bit flags + fragment offset field.
pub mod flags {
    pub const DONT_FRAGMENT: u16 = 0x4000;

    pub const MORE_FRAGMENTS: u16 = 0x2000;

    pub const OFFSET_MASK: u16 = 0x1FFF;
}

mod fields {
    use std::ops::Range;

    pub const VERSION_IHL: usize = 0;

    pub const TOS: usize = 1;

    pub const TOTAL_LEN: Range<usize> = 2 .. 4;

    pub const IDENTIFICATION: Range<usize> = 4 .. 6;

    pub const FLAGS_OFFSET: Range<usize> = 6 .. 8;

    pub const TTL: usize = 8;

    pub const PROTOCOL: usize = 9;

    pub const CHECKSUM: Range<usize> = 10 .. 12;

    pub const SRC_ADDR: Range<usize> = 12 .. 16;

    pub const DST_ADDR: Range<usize> = 16 .. 20;

    pub const OPTIONS_START: usize = 20;
}

/// View of a byte buffer as an IPv4 packet.
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
    pub const MIN_HEADER_LEN: usize = 20;

    pub const MAX_HEADER_LEN: usize = 60;

    pub const MAX_PACKET_LEN: usize = 65535;

    /// Tries to create an IPv4 packet view over a byte buffer.
    ///
    /// Only the minimum header length is checked here, see check_encoding()
    /// for the checks involving the header and total length fields.
    pub fn try_new(buffer: T) -> Result<Packet<T>> {
        if buffer.as_ref().len() < Self::MIN_HEADER_LEN {
            Err(Error::Exhausted)
        } else {
            Ok(Packet { buffer })
        }
    }

    /// Checks the version, header length, total length and header checksum.
    pub fn check_encoding(&self) -> Result<()> {
        let buffer_len = self.buffer.as_ref().len();
        let header_len = self.header_len();
        let total_len = self.total_len() as usize;

        if self.ip_version() != 4
            || header_len < Self::MIN_HEADER_LEN
            || total_len < header_len
            || buffer_len < total_len
        {
            Err(Error::Malformed)
        } else if self.gen_header_checksum() != 0 {
            Err(Error::Checksum)
        } else {
            Ok(())
        }
    }

    /// Calculates the checksum over the header, including the checksum
    /// field itself.
    pub fn gen_header_checksum(&self) -> u16 {
        let header_len = self.header_len().min(self.buffer.as_ref().len());
        internet_checksum(&self.buffer.as_ref()[.. header_len])
    }

    pub fn ip_version(&self) -> u8 {
        self.buffer.as_ref()[fields::VERSION_IHL] >> 4
    }

    /// Returns the header length in bytes.
    pub fn header_len(&self) -> usize {
        ((self.buffer.as_ref()[fields::VERSION_IHL] & 0x0F) as usize) * 4
    }

    pub fn tos(&self) -> u8 {
        self.buffer.as_ref()[fields::TOS]
    }

    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::TOTAL_LEN])
    }

    pub fn identification(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::IDENTIFICATION])
    }

    pub fn dont_fragment(&self) -> bool {
        self.flags_offset() & flags::DONT_FRAGMENT != 0
    }

    pub fn more_fragments(&self) -> bool {
        self.flags_offset() & flags::MORE_FRAGMENTS != 0
    }

    /// Returns the fragment offset in bytes.
    pub fn fragment_offset(&self) -> usize {
        ((self.flags_offset() & flags::OFFSET_MASK) as usize) * 8
    }

    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[fields::TTL]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer.as_ref()[fields::PROTOCOL]
    }

    pub fn header_checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::CHECKSUM])
    }

    pub fn src_addr(&self) -> Address {
        let mut addr = [0; 4];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::SRC_ADDR]);
        Address(addr)
    }

    pub fn dst_addr(&self) -> Address {
        let mut addr = [0; 4];
        addr.copy_from_slice(&self.buffer.as_ref()[fields::DST_ADDR]);
        Address(addr)
    }

    pub fn options(&self) -> &[u8] {
        &self.buffer.as_ref()[fields::OPTIONS_START .. self.header_len()]
    }

    /// Returns the payload, bounded by the header length and total length
    /// fields rather than the buffer, which may carry link layer padding.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.header_len() .. self.total_len() as usize]
    }

    fn flags_offset(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[fields::FLAGS_OFFSET])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Sets the version to 4 and the header length in bytes, which should be
    /// a multiple of 4.
    pub fn set_version_and_header_len(&mut self, header_len: usize) {
        self.buffer.as_mut()[fields::VERSION_IHL] = 0x40 | ((header_len / 4) as u8 & 0x0F);
    }

    pub fn set_tos(&mut self, tos: u8) {
        self.buffer.as_mut()[fields::TOS] = tos;
    }

    pub fn set_total_len(&mut self, total_len: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::TOTAL_LEN], total_len);
    }

    pub fn set_identification(&mut self, identification: u16) {
        NetworkEndian::write_u16(
            &mut self.buffer.as_mut()[fields::IDENTIFICATION],
            identification,
        );
    }

    /// Sets the flags and the fragment offset, which is given in bytes and
    /// should be a multiple of 8.
    pub fn set_flags_and_offset(&mut self, flags: u16, fragment_offset: usize) {
        let field = (flags & !flags::OFFSET_MASK) | ((fragment_offset / 8) as u16 & flags::OFFSET_MASK);
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::FLAGS_OFFSET], field);
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer.as_mut()[fields::TTL] = ttl;
    }

    pub fn set_protocol(&mut self, protocol: u8) {
        self.buffer.as_mut()[fields::PROTOCOL] = protocol;
    }

    pub fn set_header_checksum(&mut self, checksum: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[fields::CHECKSUM], checksum);
    }

    pub fn set_src_addr(&mut self, addr: Address) {
        self.buffer.as_mut()[fields::SRC_ADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn set_dst_addr(&mut self, addr: Address) {
        self.buffer.as_mut()[fields::DST_ADDR].copy_from_slice(addr.as_bytes());
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        &mut self.buffer.as_mut()[fields::OPTIONS_START .. header_len]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        &mut self.buffer.as_mut()[header_len ..]
    }

    /// Computes the header checksum with the checksum field zeroed and writes
    /// it into the header.
    pub fn fill_checksum(&mut self) {
        self.set_header_checksum(0);
        let checksum = self.gen_header_checksum();
        self.set_header_checksum(checksum);
    }
}

/// Safe representation of an IPv4 header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub protocol: u8,
    pub tos: u8,
    pub ttl: u8,
    pub identification: u16,
    pub more_fragments: bool,
    /// Offset of the payload within the original datagram, in bytes.
    pub fragment_offset: usize,
    /// Options, already padded to a multiple of 4 bytes.
    pub options: Vec<u8>,
    pub payload_len: usize,
}

impl Repr {
    /// Returns the header length needed to serialize this representation.
    pub fn header_len(&self) -> usize {
        Packet::<&[u8]>::MIN_HEADER_LEN + self.options.len()
    }

    /// Returns the packet size needed to serialize this representation.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload_len
    }

    /// Serializes the header into a packet, including the header checksum.
    pub fn serialize<T>(&self, packet: &mut Packet<T>) -> Result<()>
    where
        T: AsRef<[u8]> + AsMut<[u8]>,
    {
        let header_len = self.header_len();
        if self.options.len() % 4 != 0 || header_len > Packet::<&[u8]>::MAX_HEADER_LEN {
            return Err(Error::Malformed);
        }
        if self.buffer_len() > Packet::<&[u8]>::MAX_PACKET_LEN
            || self.buffer_len() > packet.as_ref().len()
        {
            return Err(Error::Exhausted);
        }

        let flags = if self.more_fragments {
            flags::MORE_FRAGMENTS
        } else {
            0
        };

        packet.set_version_and_header_len(header_len);
        packet.set_tos(self.tos);
        packet.set_total_len(self.buffer_len() as u16);
        packet.set_identification(self.identification);
        packet.set_flags_and_offset(flags, self.fragment_offset);
        packet.set_ttl(self.ttl);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
        packet.options_mut().copy_from_slice(&self.options);
        packet.fill_checksum();

        Ok(())
    }
}

/// Pads IPv4 options with zeros (end of option list) to a multiple of 4 bytes.
pub fn pad_options(options: &[u8]) -> Vec<u8> {
    let mut padded = options.to_vec();
    while padded.len() % 4 != 0 {
        padded.push(0);
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_buffer_less_than_min_header() {
        let buffer: [u8; 1] = [0; 1];
        assert_matches!(Packet::try_new(&buffer[..]), Err(Error::Exhausted));
    }

    #[test]
    fn test_packet_header_less_than_min_header() {
        let buffer: [u8; 20] = [
            0x44, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Err(Error::Malformed));
    }

    #[test]
    fn test_packet_buffer_less_than_total_len() {
        let buffer: [u8; 20] = [
            0x45, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Err(Error::Malformed));
    }

    #[test]
    fn test_packet_with_invalid_checksum() {
        let buffer: [u8; 20] = [
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x12, 0x34, 0x0A, 0x00,
            0x00, 0x01, 0x0A, 0x00, 0x00, 0x02,
        ];
        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Err(Error::Checksum));
    }

    #[test]
    fn test_packet_getters() {
        let buffer: [u8; 28] = [
            0x45, 0x11, 0x00, 0x18, 0xFF, 0xFF, 0x21, 0x01, 0x02, 0x03, 0x00, 0x04, 0x01, 0x02,
            0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x01, 0x02, 0x03, 0x04, 0xAA, 0xAA, 0xAA, 0xAA,
        ];

        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_eq!(4, packet.ip_version());
        assert_eq!(20, packet.header_len());
        assert_eq!(0x11, packet.tos());
        assert_eq!(24, packet.total_len());
        assert_eq!(65535, packet.identification());
        assert!(packet.more_fragments());
        assert!(!packet.dont_fragment());
        assert_eq!(257 * 8, packet.fragment_offset());
        assert_eq!(2, packet.ttl());
        assert_eq!(3, packet.protocol());
        assert_eq!(4, packet.header_checksum());
        assert_eq!(Address::new([1, 2, 3, 4]), packet.src_addr());
        assert_eq!(Address::new([5, 6, 7, 8]), packet.dst_addr());
        // Trailing link layer padding is not part of the payload.
        assert_eq!(&[1, 2, 3, 4], packet.payload());
    }

    #[test]
    fn test_repr_serialize_with_options() {
        let repr = Repr {
            src_addr: Address::new([10, 0, 0, 1]),
            dst_addr: Address::new([10, 0, 0, 2]),
            protocol: protocols::UDP,
            tos: 0,
            ttl: 64,
            identification: 7,
            more_fragments: true,
            fragment_offset: 1480,
            options: pad_options(&[0x94, 0x04, 0x00]),
            payload_len: 8,
        };

        let mut buffer = vec![0; repr.buffer_len()];
        let mut packet = Packet::try_new(&mut buffer[..]).unwrap();
        repr.serialize(&mut packet).unwrap();

        let packet = Packet::try_new(&buffer[..]).unwrap();
        assert_matches!(packet.check_encoding(), Ok(()));
        assert_eq!(24, packet.header_len());
        assert_eq!(32, packet.total_len());
        assert_eq!(7, packet.identification());
        assert!(packet.more_fragments());
        assert_eq!(1480, packet.fragment_offset());
        assert_eq!(&[0x94, 0x04, 0x00, 0x00], packet.options());
        assert_eq!(8, packet.payload().len());
    }

    #[test]
    fn test_address_subnet() {
        let netmask = Address::new([255, 255, 255, 0]);
        let addr = Address::new([10, 0, 0, 102]);
        assert!(addr.is_same_subnet(Address::new([10, 0, 0, 1]), netmask));
        assert!(!addr.is_same_subnet(Address::new([10, 0, 1, 1]), netmask));
        assert_eq!(0x0A000066, addr.as_u32());
        assert_eq!(addr, Address::from(0x0A000066));
        assert_eq!(Ok(addr), "10.0.0.102".parse());
    }
}
