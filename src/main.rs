// src/main.rs
mod engine;
mod http;
mod tap;

use std::net::Ipv4Addr;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tinystack::config::DEFAULT_MAC;
use tinystack::ethernet::MTU;
use tinystack::{BrowseStatus, MacAddress, NetStack, StackConfig, WebClient, WebRequest};
use tracing_subscriber::EnvFilter;

use engine::SystemClock;
use http::HttpServer;
use tap::TapDevice;

/// Used when no DHCP server answers.
const FALLBACK_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

#[derive(Parser, Debug)]
#[command(
    name = "tinystack",
    about = "Run the tinystack engine on a TAP interface and serve a page over HTTP."
)]
struct Args {
    /// TAP interface to create or attach to
    #[arg(default_value = "tiny0")]
    interface: String,

    /// Port the HTTP server listens on
    #[arg(long, default_value_t = 80)]
    port: u16,

    /// Host name to look up once the interface is configured
    #[arg(long, value_name = "HOST")]
    resolve: Option<String>,

    /// Path to GET from the resolved host before serving
    #[arg(long, value_name = "PATH", requires = "resolve")]
    fetch: Option<String>,

    /// Skip DHCP and use this address
    #[arg(long, value_name = "IP")]
    static_ip: Option<Ipv4Addr>,

    /// Gateway for static or fallback addressing
    #[arg(long, default_value = "192.168.1.1")]
    gateway: Ipv4Addr,

    #[arg(long, default_value = "255.255.255.0")]
    netmask: Ipv4Addr,

    /// Hardware address, as aa:bb:cc:dd:ee:ff
    #[arg(long, value_parser = parse_mac)]
    mac: Option<MacAddress>,
}

fn parse_mac(s: &str) -> Result<MacAddress, String> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for octet in mac.iter_mut() {
        let part = parts.next().ok_or_else(|| format!("{s}: expected six octets"))?;
        *octet = u8::from_str_radix(part, 16).map_err(|e| format!("{s}: {e}"))?;
    }
    if parts.next().is_some() {
        return Err(format!("{s}: expected six octets"));
    }
    Ok(MacAddress(mac))
}

/// Filter comes from `TINYSTACK_LOG` (e.g. `debug` or `tinystack=trace`); `info` otherwise.
/// The library's `log` records reach the subscriber through its log bridge.
fn init_logging() {
    let filter = EnvFilter::try_from_env("TINYSTACK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn log_response(status: BrowseStatus, data: &[u8]) {
    let status_line = data.split(|&b| b == b'\n').next().unwrap_or_default();
    info!("[WWW] {:?}: {}", status, String::from_utf8_lossy(status_line).trim_end());
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let mut tap = TapDevice::new(&args.interface).with_context(|| format!("opening TAP interface {}", args.interface))?;
    tap.set_non_blocking()?;
    info!("[SYSTEM] attached to {}", tap.name);

    let mut config = StackConfig::new(args.mac.unwrap_or(DEFAULT_MAC));
    let use_dhcp = args.static_ip.is_none();
    if let Some(ip) = args.static_ip {
        config = config.with_static(ip, args.netmask, args.gateway);
    }
    let mut stack = NetStack::new(config, tap, SystemClock::new(), StdRng::from_entropy());
    stack.register_ping_callback(|from| info!("[ICMP] ping from {}", from));
    let mut buf = [0u8; MTU];

    if use_dhcp {
        match stack.allocate_ip_address(&mut buf) {
            Ok(lease) => info!("[SYSTEM] leased {} via {}", lease.ip, lease.server),
            Err(e) => {
                warn!("[SYSTEM] {}; falling back to {}", e, FALLBACK_IP);
                stack.set_ip(FALLBACK_IP, args.netmask);
                stack.resolve_gateway(&mut buf, args.gateway)?;
            }
        }
    } else {
        stack.resolve_gateway(&mut buf, args.gateway)?;
    }

    if let Some(host) = &args.resolve {
        match stack.resolve_hostname(&mut buf, host) {
            Ok(ip) => {
                info!("[SYSTEM] {} is {}", host, ip);
                if let Some(path) = &args.fetch {
                    let mut client = WebClient::new(WebRequest::get(path, "", host), log_response);
                    if let Err(e) = stack.client_browse(&mut buf, 80, &mut client) {
                        warn!("[SYSTEM] cannot fetch {}{}: {}", host, path, e);
                    }
                }
            }
            Err(e) => warn!("[SYSTEM] cannot resolve {}: {}", host, e),
        }
    }

    stack.tcp_passive_open(args.port)?;
    let mut server = HttpServer::new();
    engine::run(&mut stack, &mut server, use_dhcp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_parsing() {
        assert_eq!(parse_mac("02:00:00:aa:bb:0c"), Ok(MacAddress([2, 0, 0, 0xaa, 0xbb, 0x0c])));
        assert!(parse_mac("02:00:00:aa:bb").is_err());
        assert!(parse_mac("02:00:00:aa:bb:cc:dd").is_err());
        assert!(parse_mac("zz:00:00:aa:bb:cc").is_err());
    }
}
