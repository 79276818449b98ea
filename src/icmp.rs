// src/icmp.rs
use crate::checksum::header_checksum;
use crate::driver::{Clock, NetworkDriver};
use crate::ethernet::{EthernetFrame, ETH_HDR_LEN};
use crate::ipv4::{IpProtocol, Ipv4Packet, DEFAULT_TTL, IP_TTL};
use crate::stack::NetStack;
use byteorder::{ByteOrder, NetworkEndian};
use log::debug;
use rand_core::RngCore;

pub const ICMP_HDR_LEN: usize = 8;
const ICMP_CHECKSUM: usize = 2;

#[derive(Debug, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    EchoRequest,
    Unknown(u8),
}

impl From<u8> for IcmpType {
    fn from(val: u8) -> Self {
        match val {
            0 => IcmpType::EchoReply,
            8 => IcmpType::EchoRequest,
            other => IcmpType::Unknown(other),
        }
    }
}

pub struct IcmpPacket<'a> {
    pub data: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < ICMP_HDR_LEN {
            return None;
        }
        Some(Self { data })
    }

    pub fn icmp_type(&self) -> IcmpType {
        IcmpType::from(self.data[0])
    }

    pub fn identifier(&self) -> u16 {
        NetworkEndian::read_u16(&self.data[4..6])
    }

    pub fn sequence(&self) -> u16 {
        NetworkEndian::read_u16(&self.data[6..8])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.data[ICMP_HDR_LEN..]
    }

    /// Zeroes and recomputes the checksum over the whole message.
    pub fn fill_checksum(buf: &mut [u8]) {
        buf[ICMP_CHECKSUM] = 0;
        buf[ICMP_CHECKSUM + 1] = 0;
        let csum = header_checksum(buf);
        NetworkEndian::write_u16(&mut buf[ICMP_CHECKSUM..ICMP_CHECKSUM + 2], csum);
    }
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    /// Rewrites an echo request for us into its echo reply.
    ///
    /// Identifier, sequence number and payload stay byte-for-byte as received. Returns
    /// the length of the reply frame, or `None` if the frame is not an echo request.
    pub fn echo_reply(&mut self, buf: &mut [u8], len: usize) -> Option<usize> {
        let len = len.min(buf.len());
        // Without an address there is nothing to answer from.
        if self.config.ip.is_unspecified() || !self.is_ip_for_us(buf, len) {
            return None;
        }
        let (ip_hlen, ip_total, from) = {
            let ip = Ipv4Packet::new(&buf[ETH_HDR_LEN..len])?;
            if ip.protocol() != IpProtocol::ICMP {
                return None;
            }
            let icmp = IcmpPacket::new(ip.payload())?;
            if icmp.icmp_type() != IcmpType::EchoRequest {
                return None;
            }
            debug!("[ICMP] echo request from {} seq {}", ip.source_ip(), icmp.sequence());
            (ip.header_length(), ip.header_length() + ip.payload().len(), ip.source_ip())
        };
        if let Some(callback) = self.ping_callback {
            callback(from);
        }

        EthernetFrame::make_return_header(buf, self.config.mac);
        let ip_buf = &mut buf[ETH_HDR_LEN..ETH_HDR_LEN + ip_total];
        Ipv4Packet::swap_addresses(ip_buf);
        // A broadcast ping is answered from our unicast address.
        ip_buf[crate::ipv4::IP_SRC..crate::ipv4::IP_SRC + 4].copy_from_slice(&self.config.ip.octets());
        ip_buf[IP_TTL] = DEFAULT_TTL;
        Ipv4Packet::fill_checksum(ip_buf, ip_hlen);

        let icmp_buf = &mut ip_buf[ip_hlen..];
        icmp_buf[0] = 0; // Echo Reply
        icmp_buf[1] = 0;
        IcmpPacket::fill_checksum(icmp_buf);

        Some(ETH_HDR_LEN + ip_total)
    }
}
