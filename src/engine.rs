// src/engine.rs
use std::hint;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use rand_core::RngCore;
use tinystack::ethernet::MTU;
use tinystack::{Clock, DhcpState, Dispatch, NetStack, NetworkDriver, TcpHandler};

/// UDP port answered with a copy of whatever arrives.
pub const ECHO_PORT: u16 = 7;

/// Milliseconds since the engine started.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

pub struct AdaptiveBackoff {
    idle_cycles: u32,
    current_sleep: Duration,
    min_sleep: Duration,
    max_sleep: Duration,
}

impl AdaptiveBackoff {
    pub fn new() -> Self {
        Self {
            idle_cycles: 0,
            current_sleep: Duration::from_micros(100),
            min_sleep: Duration::from_micros(100),
            max_sleep: Duration::from_millis(20),
        }
    }

    pub fn step(&mut self, activity: bool) {
        if activity {
            self.idle_cycles = 0;
            self.current_sleep = self.min_sleep;
        } else {
            self.idle_cycles = self.idle_cycles.saturating_add(1);
            if self.idle_cycles < 100 {
                hint::spin_loop();
            } else if self.idle_cycles < 500 {
                thread::yield_now();
            } else {
                thread::sleep(self.current_sleep);
                self.current_sleep = (self.current_sleep * 2).min(self.max_sleep);
            }
        }
    }
}

/// Polls the stack forever: TCP goes to `handler`, UDP port 7 is echoed, and an expired
/// DHCP lease is renewed when `use_dhcp` is set.
pub fn run<D, C, R, H>(stack: &mut NetStack<D, C, R>, handler: &mut H, use_dhcp: bool) -> !
where
    D: NetworkDriver,
    C: Clock,
    R: RngCore,
    H: TcpHandler,
{
    info!("[ENGINE] serving on {} ({})", stack.ip(), stack.mac());
    let mut buf = [0u8; MTU];
    let mut echo = [0u8; MTU];
    let mut backoff = AdaptiveBackoff::new();

    loop {
        let dispatch = stack.poll(&mut buf, handler);
        if let Dispatch::Udp { dst_port: ECHO_PORT, payload_offset, payload_len, .. } = dispatch {
            let data = &mut echo[..payload_len];
            data.copy_from_slice(&buf[payload_offset..payload_offset + payload_len]);
            if let Err(e) = stack.make_udp_reply_from_request(&mut buf, payload_offset + payload_len, data, ECHO_PORT) {
                warn!("[ENGINE] echo reply failed: {}", e);
            }
        }
        backoff.step(dispatch != Dispatch::Idle);

        if use_dhcp && stack.dhcp_state() == DhcpState::Renew {
            info!("[ENGINE] lease expired, renewing");
            if let Err(e) = stack.allocate_ip_address(&mut buf) {
                warn!("[ENGINE] renewal failed, keeping {}: {}", stack.ip(), e);
            }
        }
    }
}
