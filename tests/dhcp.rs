// tests/dhcp.rs
mod common;

use std::net::Ipv4Addr;

use common::*;
use tinystack::arp::{ArpOp, ArpPacket};
use tinystack::dhcp::{DhcpMessageType, DhcpPacket, DHCP_CLIENT_PORT, DHCP_SERVER_PORT, MAGIC_COOKIE};
use tinystack::ethernet::EthernetFrame;
use tinystack::{DhcpState, Error, MacAddress, StackConfig};

const SERVER_MAC: MacAddress = GATEWAY_MAC;
const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const OFFERED: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 42);
const LEASE_SECS: u32 = 60;

fn dhcp_config() -> StackConfig {
    StackConfig::new(MacAddress([0x02, 0, 0, 0xab, 0xcd, 0xef]))
}

/// A BOOTREPLY broadcast from the server carrying the usual lease options.
fn server_reply(xid: u32, msg_type: u8) -> Vec<u8> {
    server_reply_with_lease(xid, msg_type, LEASE_SECS)
}

fn server_reply_with_lease(xid: u32, msg_type: u8, lease_secs: u32) -> Vec<u8> {
    let mut msg = vec![0u8; 240];
    msg[0] = 2;
    msg[1] = 1;
    msg[2] = 6;
    msg[4..8].copy_from_slice(&xid.to_be_bytes());
    msg[16..20].copy_from_slice(&OFFERED.octets());
    msg[236..240].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    msg.extend_from_slice(&[53, 1, msg_type]);
    msg.extend_from_slice(&[54, 4, 10, 0, 0, 1]);
    msg.extend_from_slice(&[0, 0]); // padding
    msg.extend_from_slice(&[1, 4, 255, 255, 255, 0]);
    msg.extend_from_slice(&[3, 4, 10, 0, 0, 1]);
    msg.extend_from_slice(&[6, 4, 10, 0, 0, 53]);
    msg.extend_from_slice(&[51, 4]);
    msg.extend_from_slice(&lease_secs.to_be_bytes());
    msg.push(255);
    msg.resize(300, 0);

    let addr = Addressing {
        src_mac: SERVER_MAC,
        dst_mac: MacAddress::BROADCAST,
        src_ip: SERVER_IP,
        dst_ip: Ipv4Addr::BROADCAST,
    };
    udp_frame(&addr, DHCP_SERVER_PORT, DHCP_CLIENT_PORT, &msg)
}

fn sent_dhcp(frame: &[u8]) -> Option<(u32, DhcpMessageType, Sent)> {
    let sent = parse_sent(frame)?;
    if sent.dst_port != DHCP_SERVER_PORT {
        return None;
    }
    let pkt = DhcpPacket::new(&sent.payload)?;
    Some((pkt.xid(), pkt.message_type()?, sent))
}

fn feed(stack: &mut TestStack, frame: &[u8]) -> bool {
    let mut buf = frame_buf(frame);
    stack.check_for_dhcp_answer(&mut buf, frame.len())
}

fn option<'a>(payload: &'a [u8], code: u8) -> Option<&'a [u8]> {
    DhcpPacket::new(payload)?.options().find(|(c, _)| *c == code).map(|(_, v)| v)
}

#[test]
fn discover_is_broadcast_from_unspecified_address() {
    let (mut stack, _clock) = new_stack(dhcp_config());
    let mut buf = frame_buf(&[]);
    stack.dhcp_start(&mut buf).unwrap();
    assert_eq!(stack.dhcp_state(), DhcpState::Discover);

    let (xid, msg_type, sent) = sent_dhcp(stack.driver().last_sent()).unwrap();
    assert_eq!(xid, stack.dhcp_client().xid());
    assert_eq!(msg_type, DhcpMessageType::Discover);
    assert_eq!(sent.dst_mac, MacAddress::BROADCAST);
    assert_eq!(sent.src_ip, Ipv4Addr::UNSPECIFIED);
    assert_eq!(sent.dst_ip, Ipv4Addr::BROADCAST);
    assert_eq!(sent.src_port, DHCP_CLIENT_PORT);

    assert_eq!(option(&sent.payload, 61), Some(&[1, 0x02, 0, 0, 0xab, 0xcd, 0xef][..]));
    assert_eq!(option(&sent.payload, 12), Some(&b"tinystack-abcdef"[..]));
    assert_eq!(option(&sent.payload, 55), Some(&[1, 3, 6][..]));
    assert_eq!(option(&sent.payload, 50), None);
}

#[test]
fn offer_with_foreign_xid_is_ignored() {
    let (mut stack, _clock) = new_stack(dhcp_config());
    let mut buf = frame_buf(&[]);
    stack.dhcp_start(&mut buf).unwrap();
    let xid = stack.dhcp_client().xid();

    assert!(!feed(&mut stack, &server_reply(xid.wrapping_add(1), 2)));
    assert_eq!(stack.dhcp_state(), DhcpState::Discover);
    assert_eq!(stack.driver().sent.len(), 1);
}

#[test]
fn ack_before_offer_is_ignored() {
    let (mut stack, _clock) = new_stack(dhcp_config());
    let mut buf = frame_buf(&[]);
    stack.dhcp_start(&mut buf).unwrap();
    let xid = stack.dhcp_client().xid();

    assert!(!feed(&mut stack, &server_reply(xid, 5)));
    assert_eq!(stack.dhcp_state(), DhcpState::Discover);
}

#[test]
fn offer_request_ack_then_renew() {
    let (mut stack, clock) = new_stack(dhcp_config());
    let mut buf = frame_buf(&[]);
    stack.dhcp_start(&mut buf).unwrap();
    let xid = stack.dhcp_client().xid();

    assert!(feed(&mut stack, &server_reply(xid, 2)));
    assert_eq!(stack.dhcp_state(), DhcpState::Request);
    let (req_xid, msg_type, request) = sent_dhcp(stack.driver().last_sent()).unwrap();
    assert_eq!(req_xid, xid);
    assert_eq!(msg_type, DhcpMessageType::Request);
    assert_eq!(option(&request.payload, 50), Some(&OFFERED.octets()[..]));
    assert_eq!(option(&request.payload, 54), Some(&SERVER_IP.octets()[..]));

    // A second OFFER while requesting changes nothing.
    assert!(!feed(&mut stack, &server_reply(xid, 2)));

    clock.advance(1_000);
    assert!(feed(&mut stack, &server_reply(xid, 5)));
    assert_eq!(stack.dhcp_state(), DhcpState::Ok);

    let lease = stack.dhcp_lease();
    assert_eq!(lease.ip, OFFERED);
    assert_eq!(lease.netmask, Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(lease.gateway, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(lease.dns_server, Ipv4Addr::new(10, 0, 0, 53));
    assert_eq!(lease.server, SERVER_IP);
    assert_eq!(lease.lease_ms, 60_000);

    clock.advance(59_999);
    assert_eq!(stack.dhcp_state(), DhcpState::Ok);
    clock.advance(1);
    assert_eq!(stack.dhcp_state(), DhcpState::Renew);
}

#[test]
fn nak_returns_to_init() {
    let (mut stack, _clock) = new_stack(dhcp_config());
    let mut buf = frame_buf(&[]);
    stack.dhcp_start(&mut buf).unwrap();
    let xid = stack.dhcp_client().xid();
    assert!(feed(&mut stack, &server_reply(xid, 2)));

    assert!(feed(&mut stack, &server_reply(xid, 6)));
    assert_eq!(stack.dhcp_state(), DhcpState::Init);
}

#[test]
fn allocate_configures_the_stack() {
    let (mut stack, _clock) = new_stack(dhcp_config());
    stack.driver_mut().respond_with(|frame| match sent_dhcp(frame) {
        Some((xid, DhcpMessageType::Discover, _)) => vec![server_reply(xid, 2)],
        Some((xid, DhcpMessageType::Request, _)) => vec![server_reply(xid, 5)],
        _ => Vec::new(),
    });
    let mut buf = frame_buf(&[]);

    let lease = stack.allocate_ip_address(&mut buf).unwrap();
    assert_eq!(lease.ip, OFFERED);
    assert!(stack.driver().broadcast_enabled);
    assert_eq!(stack.ip(), OFFERED);
    assert_eq!(stack.config().netmask, Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(stack.config().gateway, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(stack.config().dns_server, Ipv4Addr::new(10, 0, 0, 53));

    // Gateway resolution starts right away.
    let sent = stack.driver().last_sent().to_vec();
    let eth = EthernetFrame::new(&sent).unwrap();
    let arp = ArpPacket::new(eth.payload()).unwrap();
    assert_eq!(arp.operation(), ArpOp::Request);
    assert_eq!(arp.sender_ip(), OFFERED);
    assert_eq!(arp.target_ip(), Ipv4Addr::new(10, 0, 0, 1));
}

#[test]
fn allocate_gives_up_after_ten_discovers() {
    let (mut stack, clock) = new_stack(dhcp_config());
    let mut buf = frame_buf(&[]);

    assert_eq!(stack.allocate_ip_address(&mut buf), Err(Error::DhcpTimeout(10)));

    let discovers = stack
        .driver()
        .sent
        .iter()
        .filter_map(|f| sent_dhcp(f))
        .filter(|(_, t, _)| *t == DhcpMessageType::Discover)
        .count();
    assert_eq!(discovers, 10);
    assert!(clock.now() >= 100_000);
    assert_eq!(stack.dhcp_state(), DhcpState::Init);
    assert_eq!(stack.ip(), Ipv4Addr::UNSPECIFIED);
}

#[test]
fn broadcast_accepted_only_while_negotiating() {
    let (mut stack, _clock) = configured_stack();
    let addr = Addressing {
        src_mac: PEER_MAC,
        dst_mac: MacAddress::BROADCAST,
        src_ip: PEER_IP,
        dst_ip: Ipv4Addr::BROADCAST,
    };
    let frame = udp_frame(&addr, 67, 68, b"x");
    assert!(!stack.is_ip_for_us(&frame, frame.len()));

    let mut buf = frame_buf(&[]);
    stack.dhcp_start(&mut buf).unwrap();
    assert!(stack.is_ip_for_us(&frame, frame.len()));
}

#[test]
fn zero_second_lease_is_due_for_renewal_at_once() {
    let (mut stack, clock) = new_stack(dhcp_config());
    let mut buf = frame_buf(&[]);
    stack.dhcp_start(&mut buf).unwrap();
    let xid = stack.dhcp_client().xid();
    assert!(feed(&mut stack, &server_reply(xid, 2)));

    clock.advance(5_000);
    assert!(feed(&mut stack, &server_reply_with_lease(xid, 5, 0)));

    assert_eq!(stack.dhcp_lease().lease_ms, 0);
    assert_eq!(stack.dhcp_state(), DhcpState::Renew);
}
