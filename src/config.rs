// src/config.rs
use crate::ethernet::MacAddress;
use core::net::Ipv4Addr;

/// Locally administered address used when the caller does not supply one.
pub const DEFAULT_MAC: MacAddress = MacAddress([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
pub const DEFAULT_DNS_SERVER: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

/// Retry intervals and attempt budgets for every timed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Minimum spacing between gateway who-has requests.
    pub arp_retry_ms: u64,
    pub dns_retry_ms: u64,
    pub dns_attempts: u8,
    pub dhcp_retry_ms: u64,
    pub dhcp_attempts: u8,
    pub syn_retry_ms: u64,
    pub syn_attempts: u8,
    /// A session that has seen no segment for this long is dropped.
    pub tcp_idle_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            arp_retry_ms: 1_000,
            dns_retry_ms: 60_000,
            dns_attempts: 3,
            dhcp_retry_ms: 10_000,
            dhcp_attempts: 10,
            syn_retry_ms: 3_000,
            syn_attempts: 3,
            tcp_idle_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackConfig {
    pub mac: MacAddress,
    /// Our address; `0.0.0.0` until configured or leased.
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// `0.0.0.0` disables gateway resolution.
    pub gateway: Ipv4Addr,
    pub dns_server: Ipv4Addr,
    /// Prefix of the DHCP host name; the last three MAC octets are appended in hex.
    pub hostname_prefix: &'static str,
    pub timing: Timing,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            mac: DEFAULT_MAC,
            ip: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::UNSPECIFIED,
            dns_server: DEFAULT_DNS_SERVER,
            hostname_prefix: "tinystack",
            timing: Timing::default(),
        }
    }
}

impl StackConfig {
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            ..Self::default()
        }
    }

    /// Static addressing, for networks without DHCP.
    pub fn with_static(mut self, ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        self.ip = ip;
        self.netmask = netmask;
        self.gateway = gateway;
        self
    }

    pub fn with_dns_server(mut self, dns_server: Ipv4Addr) -> Self {
        self.dns_server = dns_server;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// True when `addr` is on our directly attached subnet.
    pub fn in_subnet(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        u32::from(addr) & mask == u32::from(self.ip) & mask
    }
}
