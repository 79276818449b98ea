// src/udp.rs
use crate::checksum::pseudo_checksum;
use crate::driver::{Clock, NetworkDriver};
use crate::error::{ensure_capacity, Error, Result};
use crate::ethernet::{EtherType, EthernetFrame, MacAddress, ETH_HDR_LEN};
use crate::ipv4::{read_addr, IpProtocol, Ipv4Packet, IPV4_HDR_LEN, IP_DST, IP_SRC};
use crate::stack::NetStack;
use byteorder::{ByteOrder, NetworkEndian};
use core::net::Ipv4Addr;
use log::trace;
use rand_core::RngCore;

pub const UDP_HDR_LEN: usize = 8;
/// Offset of the UDP header in an outbound frame.
pub const UDP_HDR_OFFSET: usize = ETH_HDR_LEN + IPV4_HDR_LEN;
/// Offset of the first payload byte in an outbound frame.
pub const UDP_DATA_OFFSET: usize = UDP_HDR_OFFSET + UDP_HDR_LEN;

const UDP_LEN: usize = 4;
const UDP_CHECKSUM: usize = 6;

pub struct UdpHeader<'a> {
    pub data: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < UDP_HDR_LEN {
            return None;
        }
        Some(Self { data })
    }

    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.data[0..2])
    }

    pub fn dest_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.data[2..4])
    }

    pub fn length(&self) -> u16 {
        NetworkEndian::read_u16(&self.data[UDP_LEN..UDP_LEN + 2])
    }

    /// Payload bounded by the UDP length field.
    pub fn payload(&self) -> &'a [u8] {
        let end = (self.length() as usize).clamp(UDP_HDR_LEN, self.data.len());
        &self.data[UDP_HDR_LEN..end]
    }

    /// Writes ports and clears the length and checksum fields.
    pub fn write_ports(buf: &mut [u8], src_port: u16, dest_port: u16) {
        NetworkEndian::write_u16(&mut buf[0..2], src_port);
        NetworkEndian::write_u16(&mut buf[2..4], dest_port);
        buf[UDP_LEN..UDP_CHECKSUM + 2].fill(0);
    }

    /// Sets the length and computes the pseudo-header checksum over header and payload.
    pub fn finalize(buf: &mut [u8], src_ip: Ipv4Addr, dest_ip: Ipv4Addr, payload_len: usize) {
        let total_len = UDP_HDR_LEN + payload_len;
        NetworkEndian::write_u16(&mut buf[UDP_LEN..UDP_LEN + 2], total_len as u16);
        buf[UDP_CHECKSUM] = 0;
        buf[UDP_CHECKSUM + 1] = 0;
        let csum = pseudo_checksum(src_ip, dest_ip, IpProtocol::UDP.into(), &buf[..total_len]);
        // A computed zero is sent as all ones; zero on the wire means "no checksum".
        let final_csum = if csum == 0 { 0xFFFF } else { csum };
        NetworkEndian::write_u16(&mut buf[UDP_CHECKSUM..UDP_CHECKSUM + 2], final_csum);
    }
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    /// First half of a send: fills Ethernet, IP and UDP headers.
    ///
    /// The frame goes to the resolved gateway, or to everyone for 255.255.255.255. The
    /// caller then writes its payload at [`UDP_DATA_OFFSET`] and calls
    /// [`Self::udp_transmit`].
    pub fn udp_prepare(&mut self, buf: &mut [u8], source_port: u16, dest_ip: Ipv4Addr, dest_port: u16) -> Result<()> {
        let dest_mac = if dest_ip.is_broadcast() {
            MacAddress::BROADCAST
        } else {
            self.gateway_mac().ok_or(Error::GatewayUnknown)?
        };
        self.udp_prepare_to(buf, dest_mac, source_port, dest_ip, dest_port)
    }

    /// Like [`Self::udp_prepare`] with an explicit next-hop hardware address.
    pub fn udp_prepare_to(
        &mut self,
        buf: &mut [u8],
        dest_mac: MacAddress,
        source_port: u16,
        dest_ip: Ipv4Addr,
        dest_port: u16,
    ) -> Result<()> {
        ensure_capacity(buf, UDP_DATA_OFFSET)?;
        EthernetFrame::write_header(buf, dest_mac, self.config.mac, EtherType::IPv4);
        Ipv4Packet::write_header_pending(&mut buf[ETH_HDR_LEN..], self.config.ip, dest_ip, IpProtocol::UDP);
        UdpHeader::write_ports(&mut buf[UDP_HDR_OFFSET..], source_port, dest_port);
        Ok(())
    }

    /// Second half of a send: finalizes lengths and checksums and transmits.
    pub fn udp_transmit(&mut self, buf: &mut [u8], payload_len: usize) -> Result<()> {
        let frame_len = UDP_DATA_OFFSET + payload_len;
        ensure_capacity(buf, frame_len)?;
        let src = read_addr(&buf[ETH_HDR_LEN + IP_SRC..]);
        let dst = read_addr(&buf[ETH_HDR_LEN + IP_DST..]);
        UdpHeader::finalize(&mut buf[UDP_HDR_OFFSET..frame_len], src, dst, payload_len);
        Ipv4Packet::finalize(&mut buf[ETH_HDR_LEN..], UDP_HDR_LEN + payload_len);
        trace!("[UDP] {} byte datagram to {}", payload_len, dst);
        self.send(buf, frame_len);
        Ok(())
    }

    /// Prepares, copies `data` in and transmits in one call.
    pub fn send_udp(
        &mut self,
        buf: &mut [u8],
        data: &[u8],
        source_port: u16,
        dest_ip: Ipv4Addr,
        dest_port: u16,
    ) -> Result<()> {
        ensure_capacity(buf, UDP_DATA_OFFSET + data.len())?;
        self.udp_prepare(buf, source_port, dest_ip, dest_port)?;
        buf[UDP_DATA_OFFSET..UDP_DATA_OFFSET + data.len()].copy_from_slice(data);
        self.udp_transmit(buf, data.len())
    }

    /// Turns a received datagram into a reply carrying `data`, sent from `port` back to
    /// the requester. Returns `Ok(false)` if the frame is not a datagram for us.
    pub fn make_udp_reply_from_request(&mut self, buf: &mut [u8], len: usize, data: &[u8], port: u16) -> Result<bool> {
        let len = len.min(buf.len());
        if !self.is_ip_for_us(buf, len) {
            return Ok(false);
        }
        let (peer_mac, peer_ip, peer_port) = {
            let Some(frame) = EthernetFrame::new(&buf[..len]) else {
                return Ok(false);
            };
            let Some(ip) = Ipv4Packet::new(frame.payload()) else {
                return Ok(false);
            };
            if ip.protocol() != IpProtocol::UDP {
                return Ok(false);
            }
            let Some(udp) = UdpHeader::new(ip.payload()) else {
                return Ok(false);
            };
            (frame.source(), ip.source_ip(), udp.src_port())
        };
        ensure_capacity(buf, UDP_DATA_OFFSET + data.len())?;
        self.udp_prepare_to(buf, peer_mac, port, peer_ip, peer_port)?;
        buf[UDP_DATA_OFFSET..UDP_DATA_OFFSET + data.len()].copy_from_slice(data);
        self.udp_transmit(buf, data.len())?;
        Ok(true)
    }
}
