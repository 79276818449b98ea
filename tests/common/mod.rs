// tests/common/mod.rs
#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;

use rand::rngs::mock::StepRng;
use tinystack::arp::{ArpOp, ArpPacket};
use tinystack::ethernet::{EtherType, EthernetFrame, ETH_HDR_LEN, MTU};
use tinystack::icmp::IcmpPacket;
use tinystack::ipv4::{IpProtocol, Ipv4Packet, IPV4_HDR_LEN};
use tinystack::tcp::{TcpHandler, TcpHeader, TcpStatus, TCP_HDR_LEN};
use tinystack::udp::{UdpHeader, UDP_HDR_LEN};
use tinystack::{Clock, MacAddress, NetStack, NetworkDriver, StackConfig};

pub const OUR_MAC: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0x02]);
pub const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const GATEWAY_MAC: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0x01]);
pub const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const PEER_MAC: MacAddress = MacAddress([0x02, 0, 0, 0, 0, 0x09]);
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 9);

/// Milliseconds each empty receive advances the clock by.
pub const TICK_MS: u64 = 100;

#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn now(&self) -> u64 {
        self.0.get()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>>>;

/// In-memory controller: frames are queued by the test (or by a responder reacting to
/// what the stack sends) and every sent frame is recorded.
pub struct MockDriver {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub broadcast_enabled: bool,
    clock: ManualClock,
    responder: Option<Responder>,
}

impl MockDriver {
    pub fn push(&mut self, frame: Vec<u8>) {
        self.inbound.push_back(frame);
    }

    pub fn respond_with(&mut self, responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + 'static) {
        self.responder = Some(Box::new(responder));
    }

    pub fn last_sent(&self) -> &[u8] {
        self.sent.last().expect("nothing was sent")
    }
}

impl NetworkDriver for MockDriver {
    fn receive_frame(&mut self, buf: &mut [u8]) -> usize {
        match self.inbound.pop_front() {
            Some(frame) => {
                buf[..frame.len()].copy_from_slice(&frame);
                frame.len()
            }
            None => {
                self.clock.advance(TICK_MS);
                0
            }
        }
    }

    fn send_frame(&mut self, frame: &[u8]) {
        self.sent.push(frame.to_vec());
        if let Some(responder) = self.responder.as_mut() {
            let replies = responder(frame);
            self.inbound.extend(replies);
        }
    }

    fn enable_broadcast(&mut self) {
        self.broadcast_enabled = true;
    }

    fn disable_broadcast(&mut self) {
        self.broadcast_enabled = false;
    }
}

pub type TestStack = NetStack<MockDriver, ManualClock, StepRng>;

pub fn static_config() -> StackConfig {
    StackConfig::new(OUR_MAC).with_static(OUR_IP, NETMASK, GATEWAY_IP)
}

pub fn new_stack(config: StackConfig) -> (TestStack, ManualClock) {
    let clock = ManualClock::default();
    let driver = MockDriver {
        inbound: VecDeque::new(),
        sent: Vec::new(),
        broadcast_enabled: false,
        clock: clock.clone(),
        responder: None,
    };
    let stack = NetStack::new(config, driver, clock.clone(), StepRng::new(0x42, 1));
    (stack, clock)
}

/// A statically addressed stack that already knows the gateway's MAC.
pub fn configured_stack() -> (TestStack, ManualClock) {
    let (mut stack, clock) = new_stack(static_config());
    let mut buf = frame_buf(&arp_frame(ArpOp::Reply, GATEWAY_MAC, GATEWAY_IP, OUR_MAC, OUR_IP));
    let len = buf.len();
    stack.dispatch(&mut buf, len);
    assert!(stack.is_gateway_known());
    stack.driver_mut().sent.clear();
    (stack, clock)
}

/// Copies a frame into a full-size buffer.
pub fn frame_buf(frame: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; MTU];
    buf[..frame.len()].copy_from_slice(frame);
    buf
}

pub fn arp_frame(op: ArpOp, smac: MacAddress, sip: Ipv4Addr, tmac: MacAddress, tip: Ipv4Addr) -> Vec<u8> {
    let dest = if op == ArpOp::Request { MacAddress::BROADCAST } else { tmac };
    let mut buf = vec![0u8; ETH_HDR_LEN + 28];
    EthernetFrame::write_header(&mut buf, dest, smac, EtherType::ARP);
    ArpPacket::write(&mut buf[ETH_HDR_LEN..], op, smac, sip, tmac, tip);
    buf
}

pub fn echo_request(src_mac: MacAddress, src_ip: Ipv4Addr, id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let icmp_len = 8 + payload.len();
    let mut buf = vec![0u8; ETH_HDR_LEN + IPV4_HDR_LEN + icmp_len];
    EthernetFrame::write_header(&mut buf, OUR_MAC, src_mac, EtherType::IPv4);
    Ipv4Packet::write_header(&mut buf[ETH_HDR_LEN..], src_ip, OUR_IP, IpProtocol::ICMP, icmp_len);
    let icmp = &mut buf[ETH_HDR_LEN + IPV4_HDR_LEN..];
    icmp[0] = 8;
    icmp[4..6].copy_from_slice(&id.to_be_bytes());
    icmp[6..8].copy_from_slice(&seq.to_be_bytes());
    icmp[8..].copy_from_slice(payload);
    IcmpPacket::fill_checksum(icmp);
    buf
}

pub struct Addressing {
    pub src_mac: MacAddress,
    pub dst_mac: MacAddress,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
}

impl Addressing {
    /// From a remote host behind the gateway to us.
    pub fn inbound_from(src_ip: Ipv4Addr) -> Self {
        Self {
            src_mac: GATEWAY_MAC,
            dst_mac: OUR_MAC,
            src_ip,
            dst_ip: OUR_IP,
        }
    }
}

pub fn udp_frame(addr: &Addressing, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let l4 = ETH_HDR_LEN + IPV4_HDR_LEN;
    let mut buf = vec![0u8; l4 + UDP_HDR_LEN + payload.len()];
    EthernetFrame::write_header(&mut buf, addr.dst_mac, addr.src_mac, EtherType::IPv4);
    Ipv4Packet::write_header(&mut buf[ETH_HDR_LEN..], addr.src_ip, addr.dst_ip, IpProtocol::UDP, UDP_HDR_LEN + payload.len());
    UdpHeader::write_ports(&mut buf[l4..], src_port, dst_port);
    buf[l4 + UDP_HDR_LEN..].copy_from_slice(payload);
    UdpHeader::finalize(&mut buf[l4..], addr.src_ip, addr.dst_ip, payload.len());
    buf
}

#[allow(clippy::too_many_arguments)]
pub fn tcp_frame(addr: &Addressing, src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let l4 = ETH_HDR_LEN + IPV4_HDR_LEN;
    let mut buf = vec![0u8; l4 + TCP_HDR_LEN + payload.len()];
    EthernetFrame::write_header(&mut buf, addr.dst_mac, addr.src_mac, EtherType::IPv4);
    Ipv4Packet::write_header(&mut buf[ETH_HDR_LEN..], addr.src_ip, addr.dst_ip, IpProtocol::TCP, TCP_HDR_LEN + payload.len());
    buf[l4 + TCP_HDR_LEN..].copy_from_slice(payload);
    TcpHeader::write_header(&mut buf[l4..], src_port, dst_port, seq, ack, flags, None, addr.src_ip, addr.dst_ip, payload.len());
    buf
}

/// Fields of a frame the stack sent.
#[derive(Debug)]
pub struct Sent {
    pub dst_mac: MacAddress,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// UDP or TCP payload.
    pub payload: Vec<u8>,
    pub tcp: Option<SentTcp>,
}

#[derive(Debug, Clone, Copy)]
pub struct SentTcp {
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    pub data_offset: usize,
    pub mss: Option<u16>,
}

pub fn parse_sent(frame: &[u8]) -> Option<Sent> {
    let eth = EthernetFrame::new(frame)?;
    let ip = Ipv4Packet::new(eth.payload())?;
    match ip.protocol() {
        IpProtocol::UDP => {
            let udp = UdpHeader::new(ip.payload())?;
            Some(Sent {
                dst_mac: eth.destination(),
                src_ip: ip.source_ip(),
                dst_ip: ip.dest_ip(),
                src_port: udp.src_port(),
                dst_port: udp.dest_port(),
                payload: udp.payload().to_vec(),
                tcp: None,
            })
        }
        IpProtocol::TCP => {
            let tcp = TcpHeader::new(ip.payload())?;
            let mss = (tcp.data_offset() >= 24 && tcp.data[20] == 2)
                .then(|| u16::from_be_bytes([tcp.data[22], tcp.data[23]]));
            Some(Sent {
                dst_mac: eth.destination(),
                src_ip: ip.source_ip(),
                dst_ip: ip.dest_ip(),
                src_port: tcp.src_port(),
                dst_port: tcp.dest_port(),
                payload: tcp.payload().to_vec(),
                tcp: Some(SentTcp {
                    seq: tcp.seq_num(),
                    ack: tcp.ack_num(),
                    flags: tcp.flags(),
                    data_offset: tcp.data_offset(),
                    mss,
                }),
            })
        }
        _ => None,
    }
}

/// Records every callback and answers with a fixed payload.
#[derive(Default)]
pub struct RecordingHandler {
    pub results: Vec<(u8, TcpStatus, Vec<u8>)>,
    pub fills: usize,
    pub response: Vec<u8>,
    pub close_after_data: bool,
}

impl TcpHandler for RecordingHandler {
    fn on_result(&mut self, conn_id: u8, status: TcpStatus, offset: usize, len: usize, frame: &[u8]) -> bool {
        let data = if status == TcpStatus::Ok { frame[offset..offset + len].to_vec() } else { Vec::new() };
        self.results.push((conn_id, status, data));
        self.close_after_data
    }

    fn fill_payload(&mut self, _conn_id: u8, payload: &mut [u8]) -> usize {
        self.fills += 1;
        payload[..self.response.len()].copy_from_slice(&self.response);
        self.response.len()
    }
}
