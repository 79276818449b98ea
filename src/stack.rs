// src/stack.rs
use crate::arp::GatewayCache;
use crate::config::StackConfig;
use crate::dhcp::DhcpClient;
use crate::dns::DnsQuery;
use crate::driver::{Clock, NetworkDriver};
use crate::ethernet::{EtherType, EthernetFrame, MacAddress, ETH_HDR_LEN};
use crate::ipv4::{IpProtocol, Ipv4Packet};
use crate::tcp::{TcpHandler, TcpHeader, TcpSession};
use crate::udp::UdpHeader;
use core::net::Ipv4Addr;
use log::trace;
use rand_core::RngCore;

/// What [`NetStack::dispatch`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No frame was supplied.
    Idle,
    /// Not for us, malformed, or a protocol we do not speak.
    Dropped,
    /// Consumed by ARP or ICMP; any reply has already been transmitted.
    Answered,
    /// A datagram for us. Offsets index the frame buffer.
    Udp {
        src_port: u16,
        dst_port: u16,
        payload_offset: usize,
        payload_len: usize,
    },
    /// A segment for us. Offsets index the frame buffer.
    Tcp {
        src_port: u16,
        dst_port: u16,
        payload_offset: usize,
        payload_len: usize,
    },
}

/// All protocol state for one interface.
///
/// The frame buffer is never stored here: every operation borrows it for the duration of
/// the call, and the next receive overwrites it.
pub struct NetStack<D, C, R> {
    pub(crate) driver: D,
    pub(crate) clock: C,
    pub(crate) rng: R,
    pub(crate) config: StackConfig,
    pub(crate) gateway: GatewayCache,
    pub(crate) tcp: TcpSession,
    pub(crate) dns: DnsQuery,
    pub(crate) dhcp: DhcpClient,
    pub(crate) ping_callback: Option<fn(Ipv4Addr)>,
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    pub fn new(config: StackConfig, driver: D, clock: C, rng: R) -> Self {
        Self {
            driver,
            clock,
            rng,
            gateway: GatewayCache::new(config.gateway),
            dns: DnsQuery::new(config.dns_server),
            tcp: TcpSession::default(),
            dhcp: DhcpClient::default(),
            ping_callback: None,
            config,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn mac(&self) -> MacAddress {
        self.config.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.config.ip
    }

    /// Sets our own address and netmask.
    pub fn set_ip(&mut self, ip: Ipv4Addr, netmask: Ipv4Addr) {
        self.config.ip = ip;
        self.config.netmask = netmask;
    }

    /// `callback` is told the source of every echo request we answer.
    pub fn register_ping_callback(&mut self, callback: fn(Ipv4Addr)) {
        self.ping_callback = Some(callback);
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Hands `len` bytes of the buffer to the driver.
    pub(crate) fn send(&mut self, buf: &[u8], len: usize) {
        self.driver.send_frame(&buf[..len]);
    }

    /// True iff the frame is IPv4 addressed to us.
    ///
    /// While a DHCP exchange is running, or before we have an address at all, limited
    /// broadcast and unicast to our MAC are accepted as well.
    pub fn is_ip_for_us(&self, buf: &[u8], len: usize) -> bool {
        let Some(frame) = EthernetFrame::new(&buf[..len.min(buf.len())]) else {
            return false;
        };
        if frame.ether_type() != EtherType::IPv4 {
            return false;
        }
        let Some(ip) = Ipv4Packet::new(frame.payload()) else {
            return false;
        };
        let dest = ip.dest_ip();
        if dest == self.config.ip && !self.config.ip.is_unspecified() {
            return true;
        }
        if self.config.ip.is_unspecified() || self.dhcp.is_negotiating() {
            return dest.is_broadcast() || frame.destination() == self.config.mac;
        }
        false
    }

    /// Classifies one received frame.
    ///
    /// ARP is resolved first (requests answered, gateway replies cached), then ICMP echo.
    /// UDP and TCP for us are handed back to the caller; nothing else survives.
    /// A zero `len` means no frame arrived and gives the gateway resolver a chance to
    /// (re)send its who-has.
    pub fn dispatch(&mut self, buf: &mut [u8], len: usize) -> Dispatch {
        if len == 0 {
            self.refresh_gateway(buf);
            return Dispatch::Idle;
        }
        let len = len.min(buf.len());

        if self.classify_and_answer_arp(buf, len) {
            self.send(buf, crate::arp::ARP_FRAME_LEN);
            return Dispatch::Answered;
        }
        if self.store_gateway_mac(buf, len) {
            return Dispatch::Answered;
        }
        if !self.is_ip_for_us(buf, len) {
            trace!("[IP] dropped frame of {} bytes", len);
            return Dispatch::Dropped;
        }
        if let Some(reply_len) = self.echo_reply(buf, len) {
            self.send(buf, reply_len);
            return Dispatch::Answered;
        }

        let Some(ip) = Ipv4Packet::new(&buf[ETH_HDR_LEN..len]) else {
            return Dispatch::Dropped;
        };
        let l4_offset = ETH_HDR_LEN + ip.header_length();
        match ip.protocol() {
            IpProtocol::UDP => match UdpHeader::new(ip.payload()) {
                Some(udp) => Dispatch::Udp {
                    src_port: udp.src_port(),
                    dst_port: udp.dest_port(),
                    payload_offset: l4_offset + crate::udp::UDP_HDR_LEN,
                    payload_len: udp.payload().len(),
                },
                None => Dispatch::Dropped,
            },
            IpProtocol::TCP => match TcpHeader::new(ip.payload()) {
                Some(tcp) => Dispatch::Tcp {
                    src_port: tcp.src_port(),
                    dst_port: tcp.dest_port(),
                    payload_offset: l4_offset + tcp.data_offset(),
                    payload_len: tcp.payload().len(),
                },
                None => Dispatch::Dropped,
            },
            _ => {
                trace!("[IP] unhandled protocol {:?}", ip.protocol());
                Dispatch::Dropped
            }
        }
    }

    /// Receives at most one frame, dispatches it and steps the TCP engine.
    ///
    /// TCP timers run on every call except when a UDP datagram is returned, so that the
    /// datagram is still intact in `buf` when the caller inspects it.
    pub fn poll<H: TcpHandler + ?Sized>(&mut self, buf: &mut [u8], handler: &mut H) -> Dispatch {
        let len = self.driver.receive_frame(buf);
        let dispatch = self.dispatch(buf, len);
        match dispatch {
            Dispatch::Udp { .. } => {}
            Dispatch::Tcp { .. } => {
                self.next_tcp_state(buf, len, handler);
            }
            _ => {
                self.next_tcp_state(buf, 0, handler);
            }
        }
        dispatch
    }
}
