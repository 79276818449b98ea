// src/dns.rs
use crate::driver::{Clock, NetworkDriver};
use crate::error::{ensure_capacity, Error, Result};
use crate::ethernet::EthernetFrame;
use crate::ipv4::{read_addr, IpProtocol, Ipv4Packet};
use crate::stack::{Dispatch, NetStack};
use crate::udp::{UdpHeader, UDP_DATA_OFFSET};
use byteorder::{ByteOrder, NetworkEndian};
use core::net::Ipv4Addr;
use log::{debug, info, trace, warn};
use rand_core::RngCore;

pub const DNS_PORT: u16 = 53;
pub const DNS_HDR_LEN: usize = 12;
/// Client ports are `DNS_CLIENT_PORT_BASE | id low byte`.
pub const DNS_CLIENT_PORT_BASE: u16 = 0xE000;

const DNS_QUESTION_OFFSET: usize = UDP_DATA_OFFSET + DNS_HDR_LEN;
const QTYPE_A: u16 = 1;
const QCLASS_IN: u16 = 1;
const FLAGS_RD: u16 = 0x0100;
const MAX_LABEL_LEN: usize = 63;
/// Name plus QTYPE and QCLASS must fit the high byte of the transaction id.
const MAX_ENCODED_NAME: usize = 255 - 4;

/// State of the one outstanding lookup.
#[derive(Debug, Clone, Copy)]
pub struct DnsQuery {
    server: Ipv4Addr,
    /// Encoded question length, echoed in the id's high byte.
    question_len: u8,
    tid_low: u8,
    answer: Ipv4Addr,
    have_answer: bool,
    error: u8,
}

impl DnsQuery {
    pub fn new(server: Ipv4Addr) -> Self {
        Self {
            server,
            question_len: 0,
            tid_low: 0,
            answer: Ipv4Addr::UNSPECIFIED,
            have_answer: false,
            error: 0,
        }
    }

    pub fn server(&self) -> Ipv4Addr {
        self.server
    }

    fn transaction_id(&self) -> u16 {
        (self.question_len as u16) << 8 | self.tid_low as u16
    }

    fn client_port(&self) -> u16 {
        DNS_CLIENT_PORT_BASE | self.tid_low as u16
    }
}

/// Encodes `hostname` as DNS labels (`example.com` becomes `7 example 3 com 0`) and
/// returns the number of bytes written. A single trailing dot is accepted.
pub fn encode_name(hostname: &str, out: &mut [u8]) -> Result<usize> {
    let name = hostname.strip_suffix('.').unwrap_or(hostname);
    if name.is_empty() {
        return Err(Error::InvalidHostname);
    }
    let mut pos = 0;
    for label in name.split('.') {
        let bytes = label.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
            return Err(Error::InvalidHostname);
        }
        // Room for this label and the root byte.
        let needed = pos + 1 + bytes.len() + 1;
        if needed > MAX_ENCODED_NAME {
            return Err(Error::InvalidHostname);
        }
        ensure_capacity(out, needed)?;
        out[pos] = bytes.len() as u8;
        out[pos + 1..pos + 1 + bytes.len()].copy_from_slice(bytes);
        pos += 1 + bytes.len();
    }
    out[pos] = 0;
    Ok(pos + 1)
}

/// Skips an encoded name starting at `pos`, returning the index after it.
fn skip_name(msg: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *msg.get(pos)?;
        if len & 0xC0 == 0xC0 {
            return Some(pos + 2);
        }
        if len == 0 {
            return Some(pos + 1);
        }
        pos += 1 + len as usize;
    }
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    pub fn set_dns_server(&mut self, server: Ipv4Addr) {
        self.config.dns_server = server;
        self.dns.server = server;
    }

    pub fn dns_have_answer(&self) -> bool {
        self.dns.have_answer
    }

    /// Address from the last successful answer.
    pub fn dns_ip(&self) -> Ipv4Addr {
        self.dns.answer
    }

    /// 0 when fine, 1 when the server failed or refused recursion, 2 when the answer held
    /// no A record.
    pub fn dns_error(&self) -> u8 {
        self.dns.error
    }

    /// Sends a recursive A query for `hostname` to the configured server.
    pub fn dns_request(&mut self, buf: &mut [u8], hostname: &str) -> Result<()> {
        ensure_capacity(buf, DNS_QUESTION_OFFSET)?;
        let name_len = encode_name(hostname, &mut buf[DNS_QUESTION_OFFSET..])?;
        let question_len = name_len + 4;
        ensure_capacity(buf, DNS_QUESTION_OFFSET + question_len)?;

        self.dns.question_len = question_len as u8;
        self.dns.tid_low = self.rng.next_u32() as u8;
        self.dns.have_answer = false;
        self.dns.error = 0;

        let server = self.dns.server;
        self.udp_prepare(buf, self.dns.client_port(), server, DNS_PORT)?;

        let q = DNS_QUESTION_OFFSET + name_len;
        NetworkEndian::write_u16(&mut buf[q..q + 2], QTYPE_A);
        NetworkEndian::write_u16(&mut buf[q + 2..q + 4], QCLASS_IN);

        let hdr = &mut buf[UDP_DATA_OFFSET..DNS_QUESTION_OFFSET];
        NetworkEndian::write_u16(&mut hdr[0..2], self.dns.transaction_id());
        NetworkEndian::write_u16(&mut hdr[2..4], FLAGS_RD);
        NetworkEndian::write_u16(&mut hdr[4..6], 1); // QDCOUNT
        hdr[6..12].fill(0);

        debug!("[DNS] query {} via {} (id {:#06x})", hostname, server, self.dns.transaction_id());
        self.udp_transmit(buf, DNS_HDR_LEN + question_len)
    }

    /// Processes a possible reply to the outstanding query.
    ///
    /// Returns true when the frame answered it with an address. A matching reply that
    /// carries an error or no A record returns false and leaves [`Self::dns_error`] set.
    pub fn check_for_dns_answer(&mut self, buf: &[u8], len: usize) -> bool {
        let len = len.min(buf.len());
        if !self.is_ip_for_us(buf, len) {
            return false;
        }
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
        if udp.src_port() != DNS_PORT || udp.dest_port() != self.dns.client_port() {
            return false;
        }
        let msg = udp.payload();
        if msg.len() < DNS_HDR_LEN || NetworkEndian::read_u16(&msg[0..2]) != self.dns.transaction_id() {
            trace!("[DNS] reply with foreign id dropped");
            return false;
        }
        if msg[3] & 0x8F != 0x80 {
            warn!("[DNS] server error or no recursion (flags {:#04x})", msg[3]);
            self.dns.error = 1;
            return false;
        }

        let ancount = NetworkEndian::read_u16(&msg[6..8]);
        let question_end = DNS_HDR_LEN + self.dns.question_len as usize;
        let mut pos = question_end;

        for _ in 0..ancount {
            let Some(rr) = skip_name(msg, pos) else {
                break;
            };
            // TYPE, CLASS, TTL, RDLENGTH precede the data.
            if rr + 10 > msg.len() {
                break;
            }
            let rtype = NetworkEndian::read_u16(&msg[rr..rr + 2]);
            let rdlen = NetworkEndian::read_u16(&msg[rr + 8..rr + 10]) as usize;
            let rdata = rr + 10;
            if rtype == QTYPE_A && rdlen == 4 && rdata + 4 <= msg.len() {
                self.dns.answer = read_addr(&msg[rdata..]);
                self.dns.have_answer = true;
                self.dns.error = 0;
                info!("[DNS] answer {}", self.dns.answer);
                return true;
            }
            pos = rdata + rdlen;
        }

        debug!("[DNS] no A record among {} answers", ancount);
        self.dns.error = 2;
        false
    }

    /// Looks up `hostname`, retrying on silence, and makes the answer the TCP server.
    ///
    /// Frames arriving meanwhile still go through [`Self::dispatch`], so ARP and ping keep
    /// working. Fails with [`Error::DnsTimeout`] once `dns_attempts` requests have each
    /// gone unanswered for `dns_retry_ms`.
    pub fn resolve_hostname(&mut self, buf: &mut [u8], hostname: &str) -> Result<Ipv4Addr> {
        let timing = self.config.timing;
        if self.gateway.ip().is_unspecified() {
            return Err(Error::GatewayUnknown);
        }
        ensure_capacity(buf, DNS_QUESTION_OFFSET)?;
        // Reject bad names before any traffic.
        encode_name(hostname, &mut buf[DNS_QUESTION_OFFSET..])?;

        let give_up_at = self.clock.now_ms() + timing.dns_retry_ms * timing.dns_attempts as u64;
        let mut attempts: u8 = 0;
        let mut last_sent: Option<u64> = None;
        loop {
            let len = self.driver.receive_frame(buf);
            if let Dispatch::Udp { .. } = self.dispatch(buf, len) {
                if last_sent.is_some() {
                    if self.check_for_dns_answer(buf, len) {
                        let ip = self.dns.answer;
                        self.tcp_set_server_ip(ip);
                        return Ok(ip);
                    }
                    if self.dns.error != 0 {
                        return Err(Error::DnsRejected(self.dns.error));
                    }
                }
            }

            let now = self.clock.now_ms();
            if !self.is_gateway_known() {
                if now >= give_up_at {
                    warn!("[DNS] gateway {} never answered ARP", self.gateway.ip());
                    return Err(Error::GatewayUnknown);
                }
                continue;
            }
            let due = match last_sent {
                None => true,
                Some(at) => now.saturating_sub(at) >= timing.dns_retry_ms,
            };
            if !due {
                continue;
            }
            if attempts >= timing.dns_attempts {
                warn!("[DNS] {} unanswered after {} attempts", hostname, attempts);
                return Err(Error::DnsTimeout(attempts));
            }
            if attempts > 0 {
                warn!("[DNS] no answer for {}, retrying", hostname);
            }
            self.dns_request(buf, hostname)?;
            attempts += 1;
            last_sent = Some(now);
        }
    }
}
