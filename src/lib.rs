// src/lib.rs
#![cfg_attr(not(test), no_std)]

pub mod arp;
pub mod checksum;
pub mod config;
pub mod dhcp;
pub mod dns;
pub mod driver;
pub mod error;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod stack;
pub mod tcp;
pub mod udp;
pub mod www;

pub use config::{StackConfig, Timing};
pub use dhcp::{DhcpLease, DhcpState};
pub use driver::{Clock, NetworkDriver};
pub use error::{Error, Result};
pub use ethernet::MacAddress;
pub use stack::{Dispatch, NetStack};
pub use tcp::{TcpHandler, TcpState, TcpStatus};
pub use www::{BrowseStatus, WebClient, WebRequest};
