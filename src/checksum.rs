// src/checksum.rs
use byteorder::{ByteOrder, NetworkEndian};
use core::net::Ipv4Addr;

/// Selects what the Internet checksum covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChecksumKind {
    /// Only the bytes given, e.g. the IPv4 header.
    Header,
    /// The bytes given plus the TCP/UDP pseudo-header. The length field of the
    /// pseudo-header is the length of the covered data.
    Pseudo {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
    },
}

/// Running one's-complement sum over 16-bit big-endian words.
#[derive(Default)]
struct Accumulator {
    sum: u32,
}

impl Accumulator {
    fn add(&mut self, data: &[u8]) {
        let mut chunks = data.chunks_exact(2);
        for word in &mut chunks {
            self.sum += NetworkEndian::read_u16(word) as u32;
            self.fold();
        }
        if let Some(&last) = chunks.remainder().first() {
            self.sum += (last as u32) << 8;
            self.fold();
        }
    }

    fn add_u16(&mut self, val: u16) {
        self.sum += val as u32;
        self.fold();
    }

    fn fold(&mut self) {
        while (self.sum >> 16) != 0 {
            self.sum = (self.sum & 0xFFFF) + (self.sum >> 16);
        }
    }

    fn finish(self) -> u16 {
        !(self.sum as u16)
    }
}

pub fn checksum(data: &[u8], kind: ChecksumKind) -> u16 {
    let mut acc = Accumulator::default();
    if let ChecksumKind::Pseudo { src, dst, protocol } = kind {
        acc.add(&src.octets());
        acc.add(&dst.octets());
        acc.add_u16(protocol as u16);
        acc.add_u16(data.len() as u16);
    }
    acc.add(data);
    acc.finish()
}

/// Plain header checksum (IPv4, ICMP).
pub fn header_checksum(data: &[u8]) -> u16 {
    checksum(data, ChecksumKind::Header)
}

/// Checksum over a transport segment with its pseudo-header folded in.
/// Odd-length segments are handled without a scratch copy.
pub fn pseudo_checksum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    checksum(segment, ChecksumKind::Pseudo { src, dst, protocol })
}
