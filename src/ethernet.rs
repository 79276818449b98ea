// src/ethernet.rs
use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

pub const ETH_ADDR_LEN: usize = 6;
pub const ETH_HDR_LEN: usize = 14;
/// Largest frame the stack builds or expects (no FCS).
pub const MTU: usize = 1514;

pub const ETH_DST_MAC: usize = 0;
pub const ETH_SRC_MAC: usize = 6;
pub const ETH_TYPE: usize = 12;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct MacAddress(pub [u8; ETH_ADDR_LEN]);

impl MacAddress {
    pub const BROADCAST: Self = MacAddress([0xff; 6]);
    pub const ZERO: Self = MacAddress([0; 6]);

    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut addr = [0u8; ETH_ADDR_LEN];
        addr.copy_from_slice(&bytes[..ETH_ADDR_LEN]);
        MacAddress(addr)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EtherType {
    IPv4,
    ARP,
    Unknown(u16),
}

impl From<u16> for EtherType {
    fn from(val: u16) -> Self {
        match val {
            0x0800 => EtherType::IPv4,
            0x0806 => EtherType::ARP,
            other => EtherType::Unknown(other),
        }
    }
}

impl From<EtherType> for u16 {
    fn from(val: EtherType) -> u16 {
        match val {
            EtherType::IPv4 => 0x0800,
            EtherType::ARP => 0x0806,
            EtherType::Unknown(val) => val,
        }
    }
}

pub struct EthernetFrame<'a> {
    pub data: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < ETH_HDR_LEN {
            return None;
        }
        Some(Self { data })
    }

    pub fn destination(&self) -> MacAddress {
        MacAddress::from_slice(&self.data[ETH_DST_MAC..])
    }

    pub fn source(&self) -> MacAddress {
        MacAddress::from_slice(&self.data[ETH_SRC_MAC..])
    }

    pub fn ether_type(&self) -> EtherType {
        EtherType::from(NetworkEndian::read_u16(&self.data[ETH_TYPE..ETH_TYPE + 2]))
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETH_HDR_LEN..]
    }

    /// Writes an Ethernet header at the start of `buf`.
    pub fn write_header(buf: &mut [u8], dest: MacAddress, src: MacAddress, eth_type: EtherType) {
        buf[ETH_DST_MAC..ETH_DST_MAC + 6].copy_from_slice(&dest.0);
        buf[ETH_SRC_MAC..ETH_SRC_MAC + 6].copy_from_slice(&src.0);
        NetworkEndian::write_u16(&mut buf[ETH_TYPE..ETH_TYPE + 2], eth_type.into());
    }

    /// Turns a received frame around: the old source becomes the destination and
    /// `ours` becomes the source.
    pub fn make_return_header(buf: &mut [u8], ours: MacAddress) {
        let peer = MacAddress::from_slice(&buf[ETH_SRC_MAC..]);
        buf[ETH_DST_MAC..ETH_DST_MAC + 6].copy_from_slice(&peer.0);
        buf[ETH_SRC_MAC..ETH_SRC_MAC + 6].copy_from_slice(&ours.0);
    }
}
