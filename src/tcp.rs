// src/tcp.rs
use crate::checksum::pseudo_checksum;
use crate::driver::{Clock, NetworkDriver};
use crate::error::{ensure_capacity, Error, Result};
use crate::ethernet::{EtherType, EthernetFrame, MacAddress, ETH_HDR_LEN, MTU};
use crate::ipv4::{IpProtocol, Ipv4Packet, IPV4_HDR_LEN};
use crate::stack::NetStack;
use byteorder::{ByteOrder, NetworkEndian};
use core::net::Ipv4Addr;
use log::{debug, info, trace, warn};
use rand_core::RngCore;

pub const TCP_HDR_LEN: usize = 20;
const TCP_MSS_OPT_LEN: usize = 4;
/// Offset of the TCP header in an outbound frame.
pub const TCP_HDR_OFFSET: usize = ETH_HDR_LEN + IPV4_HDR_LEN;
/// Offset where outbound segment data, and therefore `fill_payload` output, starts.
pub const TCP_DATA_OFFSET: usize = TCP_HDR_OFFSET + TCP_HDR_LEN;

/// Local ports for active opens are `CLIENT_PORT_BASE + connection id`.
pub const CLIENT_PORT_BASE: u16 = 0x2c00;
const WINDOW: u16 = 1024;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpState {
    Closed,
    Listen,
    SynReceived,
    SynSent,
    Established,
    Closing,
}

impl TcpState {
    /// A session is in flight and another open would clobber it.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            TcpState::SynReceived | TcpState::SynSent | TcpState::Established | TcpState::Closing
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpRole {
    Server,
    Client,
}

/// Outcome passed to [`TcpHandler::on_result`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpStatus {
    /// The frame holds payload at the given offset and length.
    Ok,
    /// The peer answered our SYN with a reset.
    Refused,
    /// The peer reset an established session.
    Reset,
    /// No SYN-ACK arrived within the retry budget, or the peer went silent.
    Timeout,
}

impl TcpStatus {
    pub fn code(self) -> u8 {
        match self {
            TcpStatus::Ok => 0,
            TcpStatus::Refused => 1,
            TcpStatus::Reset => 2,
            TcpStatus::Timeout => 3,
        }
    }
}

/// Application side of the single TCP session.
pub trait TcpHandler {
    /// Called with received data, or with a non-`Ok` status when the session failed, in
    /// which case `payload_offset` and `payload_len` are meaningless. Returning true
    /// makes the engine close the session right away.
    fn on_result(
        &mut self,
        conn_id: u8,
        status: TcpStatus,
        payload_offset: usize,
        payload_len: usize,
        frame: &[u8],
    ) -> bool;

    /// Writes outgoing data into `payload` (which starts at [`TCP_DATA_OFFSET`] of the
    /// frame buffer) and returns how many bytes were written.
    fn fill_payload(&mut self, conn_id: u8, payload: &mut [u8]) -> usize;
}

/// A handler that sends nothing and never asks to close.
impl TcpHandler for () {
    fn on_result(&mut self, _: u8, _: TcpStatus, _: usize, _: usize, _: &[u8]) -> bool {
        false
    }

    fn fill_payload(&mut self, _: u8, _: &mut [u8]) -> usize {
        0
    }
}

pub struct TcpFlags;
impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

pub struct TcpHeader<'a> {
    pub data: &'a [u8],
}

impl<'a> TcpHeader<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < TCP_HDR_LEN {
            return None;
        }
        let hdr = Self { data };
        let offset = hdr.data_offset();
        if offset < TCP_HDR_LEN || offset > data.len() {
            return None;
        }
        Some(hdr)
    }

    pub fn src_port(&self) -> u16 { NetworkEndian::read_u16(&self.data[0..2]) }
    pub fn dest_port(&self) -> u16 { NetworkEndian::read_u16(&self.data[2..4]) }
    pub fn seq_num(&self) -> u32 { NetworkEndian::read_u32(&self.data[4..8]) }
    pub fn ack_num(&self) -> u32 { NetworkEndian::read_u32(&self.data[8..12]) }
    pub fn flags(&self) -> u8 { self.data[13] }

    pub fn has(&self, flag: u8) -> bool {
        self.flags() & flag != 0
    }

    pub fn data_offset(&self) -> usize {
        ((self.data[12] >> 4) as usize) * 4
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.data_offset()..]
    }

    /// Writes a header (plus an MSS option when `mss` is set) and its checksum. The
    /// payload must already sit right after the header.
    #[allow(clippy::too_many_arguments)]
    pub fn write_header(
        buf: &mut [u8],
        src_port: u16,
        dest_port: u16,
        seq: u32,
        ack: u32,
        flags: u8,
        mss: Option<u16>,
        src_ip: Ipv4Addr,
        dest_ip: Ipv4Addr,
        payload_len: usize,
    ) {
        let hdr_len = TCP_HDR_LEN + if mss.is_some() { TCP_MSS_OPT_LEN } else { 0 };
        NetworkEndian::write_u16(&mut buf[0..2], src_port);
        NetworkEndian::write_u16(&mut buf[2..4], dest_port);
        NetworkEndian::write_u32(&mut buf[4..8], seq);
        NetworkEndian::write_u32(&mut buf[8..12], ack);
        buf[12] = ((hdr_len / 4) as u8) << 4;
        buf[13] = flags;
        NetworkEndian::write_u16(&mut buf[14..16], WINDOW);
        buf[16..20].fill(0); // checksum, urgent pointer
        if let Some(mss) = mss {
            buf[20] = 2; // kind: maximum segment size
            buf[21] = 4;
            NetworkEndian::write_u16(&mut buf[22..24], mss);
        }

        let total_tcp_len = hdr_len + payload_len;
        let csum = pseudo_checksum(src_ip, dest_ip, IpProtocol::TCP.into(), &buf[..total_tcp_len]);
        NetworkEndian::write_u16(&mut buf[16..18], csum);
    }
}

/// The one TCP connection descriptor.
#[derive(Debug, Clone, Copy)]
pub struct TcpSession {
    state: TcpState,
    role: TcpRole,
    conn_id: u8,
    next_conn_id: u8,
    local_port: u16,
    remote_port: u16,
    remote_ip: Ipv4Addr,
    remote_mac: MacAddress,
    /// Next sequence number we send.
    seq: u32,
    /// Next sequence number we expect from the peer.
    ack: u32,
    listen_port: u16,
    server_ip: Ipv4Addr,
    server_mac: Option<MacAddress>,
    syn_sent_ms: u64,
    syn_attempts: u8,
    /// Last time a segment of this session arrived (or the handshake started).
    last_seen_ms: u64,
}

impl Default for TcpSession {
    fn default() -> Self {
        Self {
            state: TcpState::Closed,
            role: TcpRole::Server,
            conn_id: 0,
            next_conn_id: 0,
            local_port: 0,
            remote_port: 0,
            remote_ip: Ipv4Addr::UNSPECIFIED,
            remote_mac: MacAddress::ZERO,
            seq: 0,
            ack: 0,
            listen_port: 0,
            server_ip: Ipv4Addr::UNSPECIFIED,
            server_mac: None,
            syn_sent_ms: 0,
            syn_attempts: 0,
            last_seen_ms: 0,
        }
    }
}

impl TcpSession {
    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn role(&self) -> TcpRole {
        self.role
    }

    pub fn conn_id(&self) -> u8 {
        self.conn_id
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn remote_ip(&self) -> Ipv4Addr {
        self.remote_ip
    }

    fn allocate_conn_id(&mut self) -> u8 {
        let id = self.next_conn_id;
        self.next_conn_id = self.next_conn_id.wrapping_add(1);
        id
    }

    /// Releases the descriptor; a configured listener goes back to waiting.
    fn release(&mut self) {
        self.state = if self.listen_port != 0 { TcpState::Listen } else { TcpState::Closed };
        self.role = TcpRole::Server;
        self.syn_attempts = 0;
    }
}

/// Fields of an inbound segment, copied out before the buffer is reused.
struct Segment {
    peer_mac: MacAddress,
    peer_ip: Ipv4Addr,
    src_port: u16,
    dest_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    payload_offset: usize,
    payload_len: usize,
}

impl Segment {
    fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    pub fn current_tcp_state(&self) -> TcpState {
        self.tcp.state
    }

    pub fn tcp_session(&self) -> &TcpSession {
        &self.tcp
    }

    /// Target of the next active open. Without `mac` the resolved gateway is used.
    pub fn tcp_set_server(&mut self, ip: Ipv4Addr, mac: Option<MacAddress>) {
        self.tcp.server_ip = ip;
        self.tcp.server_mac = mac;
    }

    pub fn tcp_set_server_ip(&mut self, ip: Ipv4Addr) {
        self.tcp_set_server(ip, None);
    }

    /// Waits for connections on `port`.
    pub fn tcp_passive_open(&mut self, port: u16) -> Result<()> {
        if self.tcp.state.is_busy() {
            return Err(Error::Busy);
        }
        self.tcp.listen_port = port;
        self.tcp.state = TcpState::Listen;
        debug!("[TCP] listening on {}", port);
        Ok(())
    }

    /// Sends a SYN to the configured server and returns the new connection id.
    ///
    /// Rejected with [`Error::Busy`] while another session is in flight.
    pub fn tcp_active_open(&mut self, buf: &mut [u8], port: u16) -> Result<u8> {
        if self.tcp.state.is_busy() {
            return Err(Error::Busy);
        }
        if self.tcp.server_ip.is_unspecified() {
            return Err(Error::NoServer);
        }
        let mac = match self.tcp.server_mac {
            Some(mac) => mac,
            None => self.gateway_mac().ok_or(Error::GatewayUnknown)?,
        };
        ensure_capacity(buf, TCP_HDR_OFFSET + TCP_HDR_LEN + TCP_MSS_OPT_LEN)?;

        let conn_id = self.tcp.allocate_conn_id();
        let tcp = &mut self.tcp;
        tcp.conn_id = conn_id;
        tcp.role = TcpRole::Client;
        tcp.local_port = CLIENT_PORT_BASE.wrapping_add(conn_id as u16);
        tcp.remote_port = port;
        tcp.remote_ip = tcp.server_ip;
        tcp.remote_mac = mac;
        tcp.seq = self.rng.next_u32();
        tcp.ack = 0;
        tcp.state = TcpState::SynSent;
        tcp.syn_attempts = 0;

        info!("[TCP] connecting to {}:{} (conn {})", self.tcp.remote_ip, port, conn_id);
        self.send_syn(buf)?;
        Ok(conn_id)
    }

    /// Sends FIN from either role and waits for the final acknowledgment.
    pub fn tcp_close(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.tcp.state {
            TcpState::Established | TcpState::SynReceived => {
                self.send_segment(buf, self.tcp.seq, TcpFlags::FIN | TcpFlags::ACK, 0, None)?;
                self.tcp.seq = self.tcp.seq.wrapping_add(1);
                self.tcp.state = TcpState::Closing;
                self.tcp.last_seen_ms = self.clock.now_ms();
                debug!("[TCP] closing conn {}", self.tcp.conn_id);
            }
            TcpState::SynSent => self.tcp.release(),
            TcpState::Closed | TcpState::Listen | TcpState::Closing => {}
        }
        Ok(())
    }

    /// Steps the state machine with one received frame; `len == 0` only runs timers.
    ///
    /// The frame is processed before any timer fires, and a frame that is not part of
    /// the session is left untouched.
    pub fn next_tcp_state<H: TcpHandler + ?Sized>(&mut self, buf: &mut [u8], len: usize, handler: &mut H) -> TcpState {
        let len = len.min(buf.len());
        if len == 0 || self.process_segment(buf, len, handler) {
            self.run_tcp_timers(buf, handler);
        }
        self.tcp.state
    }

    /// Returns true when the segment belonged to the listener or the session.
    fn process_segment<H: TcpHandler + ?Sized>(&mut self, buf: &mut [u8], len: usize, handler: &mut H) -> bool {
        let Some(seg) = self.parse_segment(buf, len) else {
            return false;
        };

        if self.tcp.state == TcpState::Listen {
            return self.accept_syn(buf, &seg);
        }
        if !self.tcp.state.is_busy() || !self.matches_session(&seg) {
            trace!("[TCP] segment for {} not ours", seg.dest_port);
            return false;
        }
        self.tcp.last_seen_ms = self.clock.now_ms();

        if seg.has(TcpFlags::RST) {
            let status = if self.tcp.state == TcpState::SynSent { TcpStatus::Refused } else { TcpStatus::Reset };
            warn!("[TCP] conn {} reset by peer", self.tcp.conn_id);
            if self.tcp.role == TcpRole::Client {
                handler.on_result(self.tcp.conn_id, status, 0, 0, &buf[..len]);
            }
            self.tcp.release();
            return true;
        }

        match self.tcp.state {
            TcpState::SynSent => self.on_syn_ack(buf, &seg, handler),
            TcpState::SynReceived => {
                if seg.has(TcpFlags::SYN) && !seg.has(TcpFlags::ACK) {
                    // Our SYN-ACK was lost; answer the retransmitted SYN again.
                    if seg.seq.wrapping_add(1) == self.tcp.ack {
                        let iss = self.tcp.seq.wrapping_sub(1);
                        let mss = self.mss_for(buf);
                        let _ = self.send_segment(buf, iss, TcpFlags::SYN | TcpFlags::ACK, 0, Some(mss));
                        debug!("[TCP] repeated SYN-ACK to {}", seg.peer_ip);
                    }
                } else if seg.has(TcpFlags::ACK) && seg.ack == self.tcp.seq {
                    self.tcp.state = TcpState::Established;
                    debug!("[TCP] conn {} established with {}", self.tcp.conn_id, seg.peer_ip);
                    self.on_established_segment(buf, len, &seg, handler);
                }
            }
            TcpState::Established => self.on_established_segment(buf, len, &seg, handler),
            TcpState::Closing => self.on_closing_segment(buf, &seg),
            TcpState::Closed | TcpState::Listen => {}
        }
        true
    }

    fn parse_segment(&self, buf: &[u8], len: usize) -> Option<Segment> {
        if !self.is_ip_for_us(buf, len) {
            return None;
        }
        let frame = EthernetFrame::new(&buf[..len])?;
        let ip = Ipv4Packet::new(frame.payload())?;
        if ip.protocol() != IpProtocol::TCP {
            return None;
        }
        let segment = ip.payload();
        if pseudo_checksum(ip.source_ip(), ip.dest_ip(), IpProtocol::TCP.into(), segment) != 0 {
            trace!("[TCP] bad checksum from {}", ip.source_ip());
            return None;
        }
        let hdr = TcpHeader::new(segment)?;
        Some(Segment {
            peer_mac: frame.source(),
            peer_ip: ip.source_ip(),
            src_port: hdr.src_port(),
            dest_port: hdr.dest_port(),
            seq: hdr.seq_num(),
            ack: hdr.ack_num(),
            flags: hdr.flags(),
            payload_offset: ETH_HDR_LEN + ip.header_length() + hdr.data_offset(),
            payload_len: hdr.payload().len(),
        })
    }

    fn matches_session(&self, seg: &Segment) -> bool {
        seg.peer_ip == self.tcp.remote_ip
            && seg.src_port == self.tcp.remote_port
            && seg.dest_port == self.tcp.local_port
    }

    /// LISTEN: answer a SYN on the listen port with a SYN-ACK built in the same buffer.
    fn accept_syn(&mut self, buf: &mut [u8], seg: &Segment) -> bool {
        if seg.dest_port != self.tcp.listen_port || !seg.has(TcpFlags::SYN) || seg.has(TcpFlags::ACK) {
            return false;
        }
        let conn_id = self.tcp.allocate_conn_id();
        let tcp = &mut self.tcp;
        tcp.conn_id = conn_id;
        tcp.role = TcpRole::Server;
        tcp.local_port = seg.dest_port;
        tcp.remote_port = seg.src_port;
        tcp.remote_ip = seg.peer_ip;
        tcp.remote_mac = seg.peer_mac;
        tcp.ack = seg.seq.wrapping_add(1);
        let iss = self.rng.next_u32();

        let mss = self.mss_for(buf);
        if self.send_segment(buf, iss, TcpFlags::SYN | TcpFlags::ACK, 0, Some(mss)).is_ok() {
            self.tcp.seq = iss.wrapping_add(1);
            self.tcp.state = TcpState::SynReceived;
            self.tcp.last_seen_ms = self.clock.now_ms();
            debug!("[TCP] SYN from {}:{} (conn {})", seg.peer_ip, seg.src_port, conn_id);
        }
        true
    }

    /// SYN_SENT: a matching SYN-ACK completes the handshake and the application gets one
    /// chance to put data into the acknowledging segment.
    fn on_syn_ack<H: TcpHandler + ?Sized>(&mut self, buf: &mut [u8], seg: &Segment, handler: &mut H) {
        if !(seg.has(TcpFlags::SYN) && seg.has(TcpFlags::ACK)) || seg.ack != self.tcp.seq {
            return;
        }
        self.tcp.ack = seg.seq.wrapping_add(1);
        self.tcp.state = TcpState::Established;
        info!("[TCP] conn {} established", self.tcp.conn_id);

        let room = buf.len().saturating_sub(TCP_DATA_OFFSET);
        let filled = if room > 0 {
            handler.fill_payload(self.tcp.conn_id, &mut buf[TCP_DATA_OFFSET..]).min(room)
        } else {
            0
        };
        let flags = if filled > 0 { TcpFlags::ACK | TcpFlags::PSH } else { TcpFlags::ACK };
        if self.send_segment(buf, self.tcp.seq, flags, filled, None).is_ok() {
            self.tcp.seq = self.tcp.seq.wrapping_add(filled as u32);
        }
    }

    fn on_established_segment<H: TcpHandler + ?Sized>(
        &mut self,
        buf: &mut [u8],
        len: usize,
        seg: &Segment,
        handler: &mut H,
    ) {
        let fin = seg.has(TcpFlags::FIN);
        if seg.payload_len == 0 && !fin {
            return;
        }
        if seg.seq != self.tcp.ack {
            // Duplicate or out of order: repeat what we expect.
            let _ = self.send_segment(buf, self.tcp.seq, TcpFlags::ACK, 0, None);
            return;
        }

        let mut close_now = false;
        if seg.payload_len > 0 {
            self.tcp.ack = self.tcp.ack.wrapping_add(seg.payload_len as u32);
            close_now = handler.on_result(self.tcp.conn_id, TcpStatus::Ok, seg.payload_offset, seg.payload_len, &buf[..len]);
        }
        if fin {
            self.tcp.ack = self.tcp.ack.wrapping_add(1);
            debug!("[TCP] FIN from {}", seg.peer_ip);
        }

        let mut filled = 0;
        if self.tcp.role == TcpRole::Server && seg.payload_len > 0 {
            let room = buf.len().saturating_sub(TCP_DATA_OFFSET);
            if room > 0 {
                filled = handler.fill_payload(self.tcp.conn_id, &mut buf[TCP_DATA_OFFSET..]).min(room);
            }
        }

        let send_fin = close_now || fin;
        let mut flags = TcpFlags::ACK;
        if filled > 0 {
            flags |= TcpFlags::PSH;
        }
        if send_fin {
            flags |= TcpFlags::FIN;
        }
        if self.send_segment(buf, self.tcp.seq, flags, filled, None).is_ok() {
            self.tcp.seq = self.tcp.seq.wrapping_add(filled as u32);
            if send_fin {
                self.tcp.seq = self.tcp.seq.wrapping_add(1);
                self.tcp.state = TcpState::Closing;
            }
        }
    }

    /// CLOSING: our FIN is out. Its acknowledgment, or the peer's own FIN, ends the session.
    fn on_closing_segment(&mut self, buf: &mut [u8], seg: &Segment) {
        if seg.has(TcpFlags::FIN) {
            self.tcp.ack = seg.seq.wrapping_add(seg.payload_len as u32).wrapping_add(1);
            let _ = self.send_segment(buf, self.tcp.seq, TcpFlags::ACK, 0, None);
            debug!("[TCP] conn {} closed", self.tcp.conn_id);
            self.tcp.release();
        } else if seg.has(TcpFlags::ACK) && seg.ack == self.tcp.seq {
            debug!("[TCP] conn {} closed", self.tcp.conn_id);
            self.tcp.release();
        }
    }

    fn run_tcp_timers<H: TcpHandler + ?Sized>(&mut self, buf: &mut [u8], handler: &mut H) {
        let timing = self.config.timing;
        let now = self.clock.now_ms();
        match self.tcp.state {
            TcpState::SynSent => {
                if now.saturating_sub(self.tcp.syn_sent_ms) < timing.syn_retry_ms {
                    return;
                }
                if self.tcp.syn_attempts >= timing.syn_attempts {
                    warn!("[TCP] conn {}: no answer after {} SYNs", self.tcp.conn_id, self.tcp.syn_attempts);
                    handler.on_result(self.tcp.conn_id, TcpStatus::Timeout, 0, 0, &[]);
                    self.tcp.release();
                    return;
                }
                // The SYN consumed one sequence number; retransmit with the same one.
                self.tcp.seq = self.tcp.seq.wrapping_sub(1);
                if self.send_syn(buf).is_err() {
                    self.tcp.seq = self.tcp.seq.wrapping_add(1);
                }
            }
            TcpState::SynReceived => {
                let limit = timing.syn_retry_ms.saturating_mul(timing.syn_attempts as u64);
                if now.saturating_sub(self.tcp.last_seen_ms) >= limit {
                    warn!("[TCP] handshake with {} never completed", self.tcp.remote_ip);
                    self.tcp.release();
                }
            }
            TcpState::Established | TcpState::Closing => {
                if now.saturating_sub(self.tcp.last_seen_ms) < timing.tcp_idle_ms {
                    return;
                }
                warn!("[TCP] conn {}: {} silent, dropping", self.tcp.conn_id, self.tcp.remote_ip);
                let _ = self.send_segment(buf, self.tcp.seq, TcpFlags::RST | TcpFlags::ACK, 0, None);
                if self.tcp.role == TcpRole::Client {
                    handler.on_result(self.tcp.conn_id, TcpStatus::Timeout, 0, 0, &[]);
                }
                self.tcp.release();
            }
            TcpState::Closed | TcpState::Listen => {}
        }
    }

    fn send_syn(&mut self, buf: &mut [u8]) -> Result<()> {
        let mss = self.mss_for(buf);
        self.send_segment(buf, self.tcp.seq, TcpFlags::SYN, 0, Some(mss))?;
        self.tcp.seq = self.tcp.seq.wrapping_add(1);
        self.tcp.syn_attempts += 1;
        self.tcp.syn_sent_ms = self.clock.now_ms();
        Ok(())
    }

    fn mss_for(&self, buf: &[u8]) -> u16 {
        buf.len().min(MTU).saturating_sub(TCP_DATA_OFFSET) as u16
    }

    /// Builds a segment to the session peer from the descriptor and transmits it. Any
    /// payload must already be at [`TCP_DATA_OFFSET`].
    fn send_segment(&mut self, buf: &mut [u8], seq: u32, flags: u8, payload_len: usize, mss: Option<u16>) -> Result<()> {
        let hdr_len = TCP_HDR_LEN + if mss.is_some() { TCP_MSS_OPT_LEN } else { 0 };
        let frame_len = TCP_HDR_OFFSET + hdr_len + payload_len;
        ensure_capacity(buf, frame_len)?;

        let tcp = self.tcp;
        EthernetFrame::write_header(buf, tcp.remote_mac, self.config.mac, EtherType::IPv4);
        Ipv4Packet::write_header(&mut buf[ETH_HDR_LEN..], self.config.ip, tcp.remote_ip, IpProtocol::TCP, hdr_len + payload_len);
        TcpHeader::write_header(
            &mut buf[TCP_HDR_OFFSET..],
            tcp.local_port,
            tcp.remote_port,
            seq,
            tcp.ack,
            flags,
            mss,
            self.config.ip,
            tcp.remote_ip,
            payload_len,
        );
        self.send(buf, frame_len);
        Ok(())
    }
}
