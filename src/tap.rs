// src/tap.rs
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::AsRawFd;

use log::warn;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use thiserror::Error;
use tinystack::NetworkDriver;

nix::ioctl_write_ptr_bad!(tun_set_iff, libc::TUNSETIFF, libc::ifreq);

#[derive(Debug, Error)]
pub enum TapError {
    #[error("cannot open /dev/net/tun: {0}")]
    Open(std::io::Error),
    #[error("TUNSETIFF on {name} failed: {source}")]
    Attach { name: String, source: nix::Error },
    #[error("cannot switch to non-blocking mode: {0}")]
    NonBlocking(nix::Error),
}

/// A layer 2 TAP interface standing in for the network controller.
pub struct TapDevice {
    file: File,
    pub name: String,
}

impl TapDevice {
    /// Creates (or attaches to) the TAP interface `name`.
    /// This requires the binary to have CAP_NET_ADMIN privileges.
    pub fn new(name: &str) -> Result<Self, TapError> {
        let file = File::options()
            .read(true)
            .write(true)
            .open("/dev/net/tun")
            .map_err(TapError::Open)?;

        // IFF_TAP for Ethernet frames, IFF_NO_PI so reads start at the destination MAC.
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let ifr_name = name.as_bytes();
        let len = ifr_name.len().min(libc::IFNAMSIZ - 1);
        for (dst, src) in ifr.ifr_name.iter_mut().zip(&ifr_name[..len]) {
            *dst = *src as libc::c_char;
        }
        ifr.ifr_ifru.ifru_flags = (libc::IFF_TAP | libc::IFF_NO_PI) as libc::c_short;

        unsafe { tun_set_iff(file.as_raw_fd(), &ifr) }.map_err(|source| TapError::Attach {
            name: name.to_owned(),
            source,
        })?;

        let actual_name = unsafe { std::ffi::CStr::from_ptr(ifr.ifr_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Ok(TapDevice {
            file,
            name: actual_name,
        })
    }

    /// Reads must not block: an empty poll is how the stack learns that nothing arrived.
    pub fn set_non_blocking(&mut self) -> Result<(), TapError> {
        let fd = self.file.as_raw_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(TapError::NonBlocking)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(TapError::NonBlocking)?;
        Ok(())
    }
}

impl NetworkDriver for TapDevice {
    fn receive_frame(&mut self, buf: &mut [u8]) -> usize {
        match self.file.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => 0,
            Err(e) => {
                warn!("[TAP] read on {} failed: {}", self.name, e);
                0
            }
        }
    }

    fn send_frame(&mut self, frame: &[u8]) {
        // One write is one frame on a TAP device.
        if let Err(e) = self.file.write(frame) {
            warn!("[TAP] write of {} bytes on {} failed: {}", frame.len(), self.name, e);
        }
    }
}
