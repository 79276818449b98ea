// src/dhcp.rs
use crate::driver::{Clock, NetworkDriver};
use crate::error::{ensure_capacity, Error, Result};
use crate::ethernet::{EthernetFrame, MacAddress, ETH_HDR_LEN};
use crate::ipv4::{read_addr, IpProtocol, Ipv4Packet, IP_SRC};
use crate::stack::{Dispatch, NetStack};
use crate::udp::{UdpHeader, UDP_DATA_OFFSET};
use byteorder::{ByteOrder, NetworkEndian};
use core::net::Ipv4Addr;
use log::{debug, info, trace, warn};
use rand_core::RngCore;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const MAGIC_COOKIE: u32 = 0x63825363;

const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;
/// Fixed BOOTP fields followed by the magic cookie.
const DHCP_OPTIONS_OFFSET: usize = 240;
const COOKIE_OFFSET: usize = 236;
const FLAG_BROADCAST: u16 = 0x8000;

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS_SERVER: u8 = 6;
const OPT_HOSTNAME: u8 = 12;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_PARAM_REQUEST: u8 = 55;
const OPT_CLIENT_ID: u8 = 61;
const OPT_END: u8 = 255;

const HOSTNAME_MAX: usize = 32;
/// `-` and six hex digits.
const HOSTNAME_SUFFIX_LEN: usize = 7;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum DhcpMessageType {
    Discover,
    Offer,
    Request,
    Ack,
    Nak,
    Unknown(u8),
}

impl From<u8> for DhcpMessageType {
    fn from(val: u8) -> Self {
        match val {
            1 => DhcpMessageType::Discover,
            2 => DhcpMessageType::Offer,
            3 => DhcpMessageType::Request,
            5 => DhcpMessageType::Ack,
            6 => DhcpMessageType::Nak,
            other => DhcpMessageType::Unknown(other),
        }
    }
}

impl From<DhcpMessageType> for u8 {
    fn from(val: DhcpMessageType) -> u8 {
        match val {
            DhcpMessageType::Discover => 1,
            DhcpMessageType::Offer => 2,
            DhcpMessageType::Request => 3,
            DhcpMessageType::Ack => 5,
            DhcpMessageType::Nak => 6,
            DhcpMessageType::Unknown(v) => v,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum DhcpState {
    Init,
    Discover,
    Request,
    Ok,
    /// The lease ran out. Purely advisory: the caller starts over.
    Renew,
}

/// Addresses handed out by the server.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct DhcpLease {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns_server: Ipv4Addr,
    pub server: Ipv4Addr,
    /// Zero when the server sent no lease time, which makes the lease due at once.
    pub lease_ms: u64,
}

impl Default for DhcpLease {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns_server: Ipv4Addr::UNSPECIFIED,
            server: Ipv4Addr::UNSPECIFIED,
            lease_ms: 0,
        }
    }
}

impl DhcpLease {
    /// Takes the options we asked for out of an OFFER or ACK.
    fn absorb_options(&mut self, pkt: &DhcpPacket) {
        for (code, value) in pkt.options() {
            match (code, value.len()) {
                (OPT_SUBNET_MASK, 4..) => self.netmask = read_addr(value),
                (OPT_ROUTER, 4..) => self.gateway = read_addr(value),
                (OPT_DNS_SERVER, 4..) => self.dns_server = read_addr(value),
                (OPT_SERVER_ID, 4..) => self.server = read_addr(value),
                (OPT_LEASE_TIME, 4..) => self.lease_ms = NetworkEndian::read_u32(value) as u64 * 1000,
                _ => {}
            }
        }
    }
}

/// Client side of the lease negotiation.
#[derive(Debug, Clone, Copy)]
pub struct DhcpClient {
    state: DhcpState,
    xid: u32,
    lease: DhcpLease,
    lease_start_ms: u64,
    hostname: [u8; HOSTNAME_MAX],
    hostname_len: usize,
}

impl Default for DhcpClient {
    fn default() -> Self {
        Self {
            state: DhcpState::Init,
            xid: 0,
            lease: DhcpLease::default(),
            lease_start_ms: 0,
            hostname: [0; HOSTNAME_MAX],
            hostname_len: 0,
        }
    }
}

impl DhcpClient {
    /// DISCOVER or REQUEST in flight.
    pub fn is_negotiating(&self) -> bool {
        matches!(self.state, DhcpState::Discover | DhcpState::Request)
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn hostname(&self) -> &[u8] {
        &self.hostname[..self.hostname_len]
    }

    /// `prefix-xxxxxx`, the last three MAC octets in lowercase hex.
    fn set_hostname(&mut self, prefix: &str, mac: MacAddress) {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let prefix = prefix.as_bytes();
        let prefix = &prefix[..prefix.len().min(HOSTNAME_MAX - HOSTNAME_SUFFIX_LEN)];
        let mut len = prefix.len();
        self.hostname[..len].copy_from_slice(prefix);
        self.hostname[len] = b'-';
        len += 1;
        for b in &mac.0[3..] {
            self.hostname[len] = HEX[(b >> 4) as usize];
            self.hostname[len + 1] = HEX[(b & 0x0F) as usize];
            len += 2;
        }
        self.hostname_len = len;
    }
}

/// Iterator over `(code, value)` pairs of an options area. Stops at END or at the
/// first option running past the data.
pub struct DhcpOptions<'a> {
    data: &'a [u8],
    idx: usize,
}

impl<'a> Iterator for DhcpOptions<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        loop {
            let code = *data.get(self.idx)?;
            match code {
                OPT_END => return None,
                OPT_PAD => self.idx += 1,
                _ => {
                    let len = *data.get(self.idx + 1)? as usize;
                    let start = self.idx + 2;
                    let value = data.get(start..start + len)?;
                    self.idx = start + len;
                    return Some((code, value));
                }
            }
        }
    }
}

pub struct DhcpPacket<'a> {
    pub data: &'a [u8],
}

impl<'a> DhcpPacket<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < DHCP_OPTIONS_OFFSET {
            return None;
        }
        if NetworkEndian::read_u32(&data[COOKIE_OFFSET..DHCP_OPTIONS_OFFSET]) != MAGIC_COOKIE {
            return None;
        }
        Some(Self { data })
    }

    pub fn op(&self) -> u8 { self.data[0] }
    pub fn xid(&self) -> u32 { NetworkEndian::read_u32(&self.data[4..8]) }
    pub fn your_ip(&self) -> Ipv4Addr { read_addr(&self.data[16..20]) }

    pub fn options(&self) -> DhcpOptions<'a> {
        DhcpOptions {
            data: &self.data[DHCP_OPTIONS_OFFSET..],
            idx: 0,
        }
    }

    pub fn message_type(&self) -> Option<DhcpMessageType> {
        self.options()
            .find(|(code, value)| *code == OPT_MESSAGE_TYPE && value.len() == 1)
            .map(|(_, value)| DhcpMessageType::from(value[0]))
    }

    /// Bytes [`Self::write_request`] needs for the given host name length.
    pub fn request_len(hostname_len: usize, requesting: bool) -> usize {
        let mut len = DHCP_OPTIONS_OFFSET
            + 3 // message type
            + 9 // client id
            + 2 + hostname_len
            + 5 // parameter request list
            + 1; // end
        if requesting {
            len += 12; // requested IP, server id
        }
        len
    }

    /// Writes a BOOTREQUEST with our options and returns its length. `requested` carries
    /// the offered address and the offering server for a DHCPREQUEST.
    pub fn write_request(
        buf: &mut [u8],
        xid: u32,
        mac: MacAddress,
        msg_type: DhcpMessageType,
        hostname: &[u8],
        requested: Option<(Ipv4Addr, Ipv4Addr)>,
    ) -> usize {
        buf[..DHCP_OPTIONS_OFFSET].fill(0);
        buf[0] = BOOTREQUEST;
        buf[1] = 1; // Hardware Type: Ethernet
        buf[2] = 6; // Hardware Addr Len
        NetworkEndian::write_u32(&mut buf[4..8], xid);
        // Ask for broadcast replies, we have no address to receive unicast on yet.
        NetworkEndian::write_u16(&mut buf[10..12], FLAG_BROADCAST);
        buf[28..34].copy_from_slice(&mac.0);
        NetworkEndian::write_u32(&mut buf[COOKIE_OFFSET..DHCP_OPTIONS_OFFSET], MAGIC_COOKIE);

        let mut idx = DHCP_OPTIONS_OFFSET;
        buf[idx] = OPT_MESSAGE_TYPE; buf[idx + 1] = 1; buf[idx + 2] = msg_type.into();
        idx += 3;

        buf[idx] = OPT_CLIENT_ID; buf[idx + 1] = 7; buf[idx + 2] = 1;
        buf[idx + 3..idx + 9].copy_from_slice(&mac.0);
        idx += 9;

        buf[idx] = OPT_HOSTNAME; buf[idx + 1] = hostname.len() as u8;
        buf[idx + 2..idx + 2 + hostname.len()].copy_from_slice(hostname);
        idx += 2 + hostname.len();

        if let Some((ip, server)) = requested {
            buf[idx] = OPT_REQUESTED_IP; buf[idx + 1] = 4;
            buf[idx + 2..idx + 6].copy_from_slice(&ip.octets());
            idx += 6;
            buf[idx] = OPT_SERVER_ID; buf[idx + 1] = 4;
            buf[idx + 2..idx + 6].copy_from_slice(&server.octets());
            idx += 6;
        }

        buf[idx] = OPT_PARAM_REQUEST; buf[idx + 1] = 3;
        buf[idx + 2] = OPT_SUBNET_MASK;
        buf[idx + 3] = OPT_ROUTER;
        buf[idx + 4] = OPT_DNS_SERVER;
        idx += 5;

        buf[idx] = OPT_END;
        idx + 1
    }
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    /// Forgets any lease and broadcasts a DHCPDISCOVER with a fresh transaction id.
    pub fn dhcp_start(&mut self, buf: &mut [u8]) -> Result<()> {
        self.dhcp.lease = DhcpLease::default();
        self.dhcp.xid = self.rng.next_u32();
        let prefix = self.config.hostname_prefix;
        let mac = self.config.mac;
        self.dhcp.set_hostname(prefix, mac);

        self.send_dhcp(buf, DhcpMessageType::Discover)?;
        self.dhcp.state = DhcpState::Discover;
        debug!("[DHCP] DISCOVER xid {:#010x}", self.dhcp.xid);
        Ok(())
    }

    fn send_dhcp(&mut self, buf: &mut [u8], msg_type: DhcpMessageType) -> Result<()> {
        let requesting = msg_type == DhcpMessageType::Request;
        let msg_len = DhcpPacket::request_len(self.dhcp.hostname_len, requesting);
        ensure_capacity(buf, UDP_DATA_OFFSET + msg_len)?;

        self.udp_prepare_to(buf, MacAddress::BROADCAST, DHCP_CLIENT_PORT, Ipv4Addr::BROADCAST, DHCP_SERVER_PORT)?;
        // Always sent from 0.0.0.0: the offered address is not ours until ACKed.
        buf[ETH_HDR_LEN + IP_SRC..ETH_HDR_LEN + IP_SRC + 4].fill(0);

        let requested = requesting.then_some((self.dhcp.lease.ip, self.dhcp.lease.server));
        let client = self.dhcp;
        let len = DhcpPacket::write_request(
            &mut buf[UDP_DATA_OFFSET..],
            client.xid,
            self.config.mac,
            msg_type,
            client.hostname(),
            requested,
        );
        self.udp_transmit(buf, len)
    }

    /// Processes a possible server reply. An OFFER (while discovering) is answered with a
    /// DHCPREQUEST from the same buffer; an ACK (while requesting) completes the lease;
    /// a NAK sends us back to INIT. Returns true if the frame was one of these.
    pub fn check_for_dhcp_answer(&mut self, buf: &mut [u8], len: usize) -> bool {
        let len = len.min(buf.len());
        if len < UDP_DATA_OFFSET + DHCP_OPTIONS_OFFSET || !self.is_ip_for_us(buf, len) {
            return false;
        }
        let (msg_type, lease) = {
            let Some(frame) = EthernetFrame::new(&buf[..len]) else {
                return false;
            };
            let Some(ip) = Ipv4Packet::new(frame.payload()) else {
                return false;
            };
            if ip.protocol() != IpProtocol::UDP {
                return false;
            }
            let Some(udp) = UdpHeader::new(ip.payload()) else {
                return false;
            };
            if udp.src_port() != DHCP_SERVER_PORT || udp.dest_port() != DHCP_CLIENT_PORT {
                return false;
            }
            let Some(pkt) = DhcpPacket::new(udp.payload()) else {
                return false;
            };
            if pkt.op() != BOOTREPLY || pkt.xid() != self.dhcp.xid {
                trace!("[DHCP] reply for xid {:#010x} ignored", pkt.xid());
                return false;
            }
            let Some(msg_type) = pkt.message_type() else {
                return false;
            };
            let mut lease = self.dhcp.lease;
            if !pkt.your_ip().is_unspecified() {
                lease.ip = pkt.your_ip();
            }
            lease.absorb_options(&pkt);
            (msg_type, lease)
        };

        match (msg_type, self.dhcp.state) {
            (DhcpMessageType::Offer, DhcpState::Discover) => {
                self.dhcp.lease = lease;
                debug!("[DHCP] OFFER {} from {}", lease.ip, lease.server);
                if let Err(e) = self.send_dhcp(buf, DhcpMessageType::Request) {
                    warn!("[DHCP] cannot send REQUEST: {}", e);
                    return true;
                }
                self.dhcp.state = DhcpState::Request;
                true
            }
            (DhcpMessageType::Ack, DhcpState::Request) => {
                self.dhcp.lease = lease;
                self.dhcp.lease_start_ms = self.clock.now_ms();
                self.dhcp.state = DhcpState::Ok;
                info!(
                    "[DHCP] lease {} mask {} gw {} dns {} for {} s",
                    lease.ip,
                    lease.netmask,
                    lease.gateway,
                    lease.dns_server,
                    lease.lease_ms / 1000
                );
                true
            }
            (DhcpMessageType::Nak, DhcpState::Discover | DhcpState::Request) => {
                warn!("[DHCP] NAK from {}", lease.server);
                self.dhcp.state = DhcpState::Init;
                true
            }
            _ => false,
        }
    }

    /// Current state. A lease that has run out turns OK into RENEW.
    pub fn dhcp_state(&mut self) -> DhcpState {
        let client = &mut self.dhcp;
        if client.state == DhcpState::Ok {
            let expires = client.lease_start_ms.saturating_add(client.lease.lease_ms);
            if self.clock.now_ms() >= expires {
                info!("[DHCP] lease on {} expired", client.lease.ip);
                client.state = DhcpState::Renew;
            }
        }
        client.state
    }

    pub fn dhcp_lease(&self) -> DhcpLease {
        self.dhcp.lease
    }

    pub fn dhcp_client(&self) -> &DhcpClient {
        &self.dhcp
    }

    /// Runs the whole negotiation and configures the stack from the lease.
    ///
    /// DISCOVER is re-sent every `dhcp_retry_ms` until a lease arrives; after
    /// `dhcp_attempts` unanswered rounds this fails with [`Error::DhcpTimeout`].
    pub fn allocate_ip_address(&mut self, buf: &mut [u8]) -> Result<DhcpLease> {
        let timing = self.config.timing;
        self.driver.enable_broadcast();
        self.dhcp_start(buf)?;
        let mut attempts: u8 = 1;
        let mut started = self.clock.now_ms();

        while self.dhcp.state != DhcpState::Ok {
            let len = self.driver.receive_frame(buf);
            if let Dispatch::Udp { .. } = self.dispatch(buf, len) {
                self.check_for_dhcp_answer(buf, len);
                if self.dhcp.state == DhcpState::Ok {
                    break;
                }
            }

            let now = self.clock.now_ms();
            if now.saturating_sub(started) < timing.dhcp_retry_ms {
                continue;
            }
            if attempts >= timing.dhcp_attempts {
                warn!("[DHCP] no lease after {} attempts", attempts);
                self.dhcp.state = DhcpState::Init;
                return Err(Error::DhcpTimeout(attempts));
            }
            warn!("[DHCP] no lease yet, retrying");
            self.dhcp_start(buf)?;
            attempts += 1;
            started = now;
        }

        let lease = self.dhcp.lease;
        self.set_ip(lease.ip, lease.netmask);
        if !lease.dns_server.is_unspecified() {
            self.set_dns_server(lease.dns_server);
        }
        if !lease.gateway.is_unspecified() {
            self.set_gateway(lease.gateway);
            self.resolve_gateway(buf, lease.gateway)?;
        }
        Ok(lease)
    }
}
