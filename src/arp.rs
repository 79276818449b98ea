// src/arp.rs
use crate::driver::{Clock, NetworkDriver};
use crate::error::{ensure_capacity, Result};
use crate::ethernet::{EtherType, EthernetFrame, MacAddress, ETH_HDR_LEN};
use crate::ipv4::read_addr;
use crate::stack::NetStack;
use byteorder::{ByteOrder, NetworkEndian};
use core::net::Ipv4Addr;
use log::{debug, info};
use rand_core::RngCore;

pub const ARP_HDR_LEN: usize = 28;
pub const ARP_FRAME_LEN: usize = ETH_HDR_LEN + ARP_HDR_LEN;

// Field offsets inside the ARP packet.
const ARP_OPCODE: usize = 6;
const ARP_SENDER_MAC: usize = 8;
const ARP_SENDER_IP: usize = 14;
const ARP_TARGET_MAC: usize = 18;
const ARP_TARGET_IP: usize = 24;

#[derive(Debug, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Unknown(u16),
}

impl From<u16> for ArpOp {
    fn from(val: u16) -> Self {
        match val {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            other => ArpOp::Unknown(other),
        }
    }
}

impl From<ArpOp> for u16 {
    fn from(op: ArpOp) -> u16 {
        match op {
            ArpOp::Request => 1,
            ArpOp::Reply => 2,
            ArpOp::Unknown(val) => val,
        }
    }
}

pub struct ArpPacket<'a> {
    pub data: &'a [u8],
}

impl<'a> ArpPacket<'a> {
    /// Only Ethernet/IPv4 ARP is recognised.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < ARP_HDR_LEN {
            return None;
        }
        let is_eth_ipv4 = NetworkEndian::read_u16(&data[0..2]) == 1
            && NetworkEndian::read_u16(&data[2..4]) == 0x0800
            && data[4] == 6
            && data[5] == 4;
        if !is_eth_ipv4 {
            return None;
        }
        Some(Self { data })
    }

    pub fn operation(&self) -> ArpOp {
        ArpOp::from(NetworkEndian::read_u16(&self.data[ARP_OPCODE..ARP_OPCODE + 2]))
    }

    pub fn sender_mac(&self) -> MacAddress {
        MacAddress::from_slice(&self.data[ARP_SENDER_MAC..])
    }

    pub fn sender_ip(&self) -> Ipv4Addr {
        read_addr(&self.data[ARP_SENDER_IP..])
    }

    pub fn target_mac(&self) -> MacAddress {
        MacAddress::from_slice(&self.data[ARP_TARGET_MAC..])
    }

    pub fn target_ip(&self) -> Ipv4Addr {
        read_addr(&self.data[ARP_TARGET_IP..])
    }

    /// Writes a complete ARP packet into the buffer.
    pub fn write(
        buf: &mut [u8],
        op: ArpOp,
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: MacAddress,
        target_ip: Ipv4Addr,
    ) {
        NetworkEndian::write_u16(&mut buf[0..2], 1); // Ethernet
        NetworkEndian::write_u16(&mut buf[2..4], 0x0800); // IPv4
        buf[4] = 6;
        buf[5] = 4;
        NetworkEndian::write_u16(&mut buf[ARP_OPCODE..ARP_OPCODE + 2], op.into());
        buf[ARP_SENDER_MAC..ARP_SENDER_MAC + 6].copy_from_slice(&sender_mac.0);
        buf[ARP_SENDER_IP..ARP_SENDER_IP + 4].copy_from_slice(&sender_ip.octets());
        buf[ARP_TARGET_MAC..ARP_TARGET_MAC + 6].copy_from_slice(&target_mac.0);
        buf[ARP_TARGET_IP..ARP_TARGET_IP + 4].copy_from_slice(&target_ip.octets());
    }

    /// Rewrites a request into its reply in place: the requester becomes the target and
    /// we become the sender.
    pub fn make_reply_in_place(buf: &mut [u8], our_mac: MacAddress, our_ip: Ipv4Addr) {
        NetworkEndian::write_u16(&mut buf[ARP_OPCODE..ARP_OPCODE + 2], ArpOp::Reply.into());
        buf.copy_within(ARP_SENDER_MAC..ARP_SENDER_IP + 4, ARP_TARGET_MAC);
        buf[ARP_SENDER_MAC..ARP_SENDER_MAC + 6].copy_from_slice(&our_mac.0);
        buf[ARP_SENDER_IP..ARP_SENDER_IP + 4].copy_from_slice(&our_ip.octets());
    }
}

/// Resolved hardware address of the configured gateway.
#[derive(Debug, Clone, Copy)]
pub struct GatewayCache {
    ip: Ipv4Addr,
    mac: MacAddress,
    awaiting: bool,
    last_request_ms: Option<u64>,
}

impl GatewayCache {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            mac: MacAddress::ZERO,
            awaiting: true,
            last_request_ms: None,
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn mac(&self) -> Option<MacAddress> {
        (!self.awaiting).then_some(self.mac)
    }
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    /// Answers an ARP request for our address by rewriting the buffer into the reply.
    ///
    /// Returns false, leaving the buffer untouched, for anything else.
    pub fn classify_and_answer_arp(&mut self, buf: &mut [u8], len: usize) -> bool {
        if self.config.ip.is_unspecified() || len < ARP_FRAME_LEN || buf.len() < ARP_FRAME_LEN {
            return false;
        }
        let Some(frame) = EthernetFrame::new(&buf[..len]) else {
            return false;
        };
        if frame.ether_type() != EtherType::ARP {
            return false;
        }
        let Some(arp) = ArpPacket::new(frame.payload()) else {
            return false;
        };
        if arp.operation() != ArpOp::Request || arp.target_ip() != self.config.ip {
            return false;
        }
        debug!("[ARP] who-has {} from {}", self.config.ip, arp.sender_ip());

        EthernetFrame::make_return_header(buf, self.config.mac);
        ArpPacket::make_reply_in_place(&mut buf[ETH_HDR_LEN..], self.config.mac, self.config.ip);
        true
    }

    /// Changes the gateway. Its hardware address must be resolved again.
    pub fn set_gateway(&mut self, gateway_ip: Ipv4Addr) {
        self.config.gateway = gateway_ip;
        self.gateway = GatewayCache::new(gateway_ip);
    }

    /// Broadcasts a who-has for `gateway_ip` and waits for [`Self::store_gateway_mac`].
    pub fn resolve_gateway(&mut self, buf: &mut [u8], gateway_ip: Ipv4Addr) -> Result<()> {
        ensure_capacity(buf, ARP_FRAME_LEN)?;
        if gateway_ip != self.gateway.ip {
            self.set_gateway(gateway_ip);
        }
        EthernetFrame::write_header(buf, MacAddress::BROADCAST, self.config.mac, EtherType::ARP);
        ArpPacket::write(
            &mut buf[ETH_HDR_LEN..],
            ArpOp::Request,
            self.config.mac,
            self.config.ip,
            MacAddress::ZERO,
            gateway_ip,
        );
        self.gateway.awaiting = true;
        self.gateway.last_request_ms = Some(self.clock.now_ms());
        debug!("[ARP] who-has {} (gateway)", gateway_ip);
        self.send(buf, ARP_FRAME_LEN);
        Ok(())
    }

    /// Caches the gateway's hardware address from a matching ARP reply.
    ///
    /// Only a reply whose sender is the configured gateway, and only when that gateway
    /// lies in our subnet, is trusted.
    pub fn store_gateway_mac(&mut self, buf: &[u8], len: usize) -> bool {
        let gw = self.gateway.ip;
        if gw.is_unspecified() || !self.config.in_subnet(gw) {
            return false;
        }
        let Some(frame) = EthernetFrame::new(&buf[..len.min(buf.len())]) else {
            return false;
        };
        if frame.ether_type() != EtherType::ARP {
            return false;
        }
        let Some(arp) = ArpPacket::new(frame.payload()) else {
            return false;
        };
        if arp.operation() != ArpOp::Reply || arp.sender_ip() != gw {
            return false;
        }
        self.gateway.mac = arp.sender_mac();
        if self.gateway.awaiting {
            info!("[ARP] gateway {} is at {}", gw, self.gateway.mac);
        }
        self.gateway.awaiting = false;
        true
    }

    pub fn is_gateway_known(&self) -> bool {
        !self.gateway.awaiting
    }

    pub fn gateway_mac(&self) -> Option<MacAddress> {
        self.gateway.mac()
    }

    /// Re-sends the gateway who-has while unresolved, paced by `arp_retry_ms`.
    pub(crate) fn refresh_gateway(&mut self, buf: &mut [u8]) {
        let gw = self.gateway.ip;
        if !self.gateway.awaiting || gw.is_unspecified() || self.config.ip.is_unspecified() {
            return;
        }
        let due = match self.gateway.last_request_ms {
            None => true,
            Some(last) => self.clock.now_ms().saturating_sub(last) >= self.config.timing.arp_retry_ms,
        };
        if due {
            // A buffer too small for ARP cannot carry anything else either.
            let _ = self.resolve_gateway(buf, gw);
        }
    }
}
