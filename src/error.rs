// src/error.rs
use thiserror::Error;

/// Failures an engine operation reports to its caller.
///
/// Inbound frames never produce an `Error`: malformed, foreign or unexpected frames are
/// dropped and the handler reports "not handled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("frame buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
    #[error("gateway hardware address is not resolved yet")]
    GatewayUnknown,
    #[error("a TCP session is already in progress")]
    Busy,
    #[error("no TCP server address configured")]
    NoServer,
    #[error("hostname cannot be encoded as a DNS name")]
    InvalidHostname,
    #[error("DNS server answered with error {0}")]
    DnsRejected(u8),
    #[error("DNS lookup unanswered after {0} attempts")]
    DnsTimeout(u8),
    #[error("no DHCP lease after {0} attempts")]
    DhcpTimeout(u8),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Fails with [`Error::BufferTooSmall`] unless `buf` can hold `needed` bytes.
pub(crate) fn ensure_capacity(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            capacity: buf.len(),
        });
    }
    Ok(())
}
