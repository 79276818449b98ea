// src/ipv4.rs
use crate::checksum::header_checksum;
use byteorder::{ByteOrder, NetworkEndian};
use core::net::Ipv4Addr;

pub const IPV4_HDR_LEN: usize = 20;

// Field offsets inside the IP header.
pub const IP_TOTLEN: usize = 2;
pub const IP_TTL: usize = 8;
pub const IP_PROTO: usize = 9;
pub const IP_CHECKSUM: usize = 10;
pub const IP_SRC: usize = 12;
pub const IP_DST: usize = 16;

pub const DEFAULT_TTL: u8 = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IpProtocol {
    ICMP,
    TCP,
    UDP,
    Unknown(u8),
}

impl From<u8> for IpProtocol {
    fn from(val: u8) -> Self {
        match val {
            1 => IpProtocol::ICMP,
            6 => IpProtocol::TCP,
            17 => IpProtocol::UDP,
            other => IpProtocol::Unknown(other),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(val: IpProtocol) -> u8 {
        match val {
            IpProtocol::ICMP => 1,
            IpProtocol::TCP => 6,
            IpProtocol::UDP => 17,
            IpProtocol::Unknown(p) => p,
        }
    }
}

pub struct Ipv4Packet<'a> {
    pub data: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    /// Accepts only version 4 headers whose length nibble fits inside `data`.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < IPV4_HDR_LEN || data[0] >> 4 != 4 {
            return None;
        }
        let pkt = Self { data };
        let hlen = pkt.header_length();
        if hlen < IPV4_HDR_LEN || hlen > data.len() {
            return None;
        }
        Some(pkt)
    }

    pub fn header_length(&self) -> usize {
        ((self.data[0] & 0x0F) as usize) * 4
    }

    pub fn total_length(&self) -> usize {
        NetworkEndian::read_u16(&self.data[IP_TOTLEN..IP_TOTLEN + 2]) as usize
    }

    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.data[IP_PROTO])
    }

    pub fn source_ip(&self) -> Ipv4Addr {
        read_addr(&self.data[IP_SRC..])
    }

    pub fn dest_ip(&self) -> Ipv4Addr {
        read_addr(&self.data[IP_DST..])
    }

    /// Payload bounded by the total-length field, so Ethernet padding is excluded.
    pub fn payload(&self) -> &'a [u8] {
        let end = self.total_length().clamp(self.header_length(), self.data.len());
        &self.data[self.header_length()..end]
    }

    /// Writes a 20-byte IPv4 header and its checksum into the buffer.
    pub fn write_header(
        buf: &mut [u8],
        src_ip: Ipv4Addr,
        dest_ip: Ipv4Addr,
        protocol: IpProtocol,
        payload_len: usize,
    ) {
        Self::write_header_pending(buf, src_ip, dest_ip, protocol);
        Self::finalize(buf, payload_len);
    }

    /// Writes every field except total length and checksum.
    pub fn write_header_pending(buf: &mut [u8], src_ip: Ipv4Addr, dest_ip: Ipv4Addr, protocol: IpProtocol) {
        buf[0] = 0x45; // Version 4, IHL 5
        buf[1] = 0;
        NetworkEndian::write_u16(&mut buf[4..6], 0); // Identification
        NetworkEndian::write_u16(&mut buf[6..8], 0x4000); // Don't Fragment
        buf[IP_TTL] = DEFAULT_TTL;
        buf[IP_PROTO] = protocol.into();
        buf[IP_SRC..IP_SRC + 4].copy_from_slice(&src_ip.octets());
        buf[IP_DST..IP_DST + 4].copy_from_slice(&dest_ip.octets());
    }

    /// Sets total length for a 20-byte header and recomputes the checksum.
    pub fn finalize(buf: &mut [u8], payload_len: usize) {
        NetworkEndian::write_u16(&mut buf[IP_TOTLEN..IP_TOTLEN + 2], (IPV4_HDR_LEN + payload_len) as u16);
        Self::fill_checksum(buf, IPV4_HDR_LEN);
    }

    /// Zeroes and recomputes the checksum over a header of `header_len` bytes.
    pub fn fill_checksum(buf: &mut [u8], header_len: usize) {
        buf[IP_CHECKSUM] = 0;
        buf[IP_CHECKSUM + 1] = 0;
        let csum = header_checksum(&buf[..header_len]);
        NetworkEndian::write_u16(&mut buf[IP_CHECKSUM..IP_CHECKSUM + 2], csum);
    }

    /// Exchanges source and destination addresses in place.
    pub fn swap_addresses(buf: &mut [u8]) {
        let mut src = [0u8; 4];
        src.copy_from_slice(&buf[IP_SRC..IP_SRC + 4]);
        buf.copy_within(IP_DST..IP_DST + 4, IP_SRC);
        buf[IP_DST..IP_DST + 4].copy_from_slice(&src);
    }
}

pub fn read_addr(bytes: &[u8]) -> Ipv4Addr {
    let mut addr = [0u8; 4];
    addr.copy_from_slice(&bytes[..4]);
    Ipv4Addr::from(addr)
}
