// src/www.rs
//! A small HTTP client on top of the TCP client role.
//!
//! The request is written into the acknowledging segment of the handshake and the first
//! segment of the answer is classified by its status line. Nothing is allocated: the
//! request borrows its strings and the callback sees the response in the frame buffer.

use crate::driver::{Clock, NetworkDriver};
use crate::error::Result;
use crate::stack::NetStack;
use crate::tcp::{TcpHandler, TcpStatus};
use core::fmt::{self, Write};
use log::{debug, warn};
use rand_core::RngCore;

const USER_AGENT: &str = "tinystack/0.1";

/// Outcome handed to the response callback.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BrowseStatus {
    /// `200 OK`.
    Ok,
    /// Any other HTTP status.
    HttpError,
    /// The peer did not answer with HTTP, or the connection failed.
    NotHttp,
}

impl BrowseStatus {
    pub fn code(self) -> u8 {
        match self {
            BrowseStatus::Ok => 0,
            BrowseStatus::HttpError => 1,
            BrowseStatus::NotHttp => 2,
        }
    }

    /// Classifies the first bytes of a response.
    pub fn from_response(data: &[u8]) -> Self {
        if data.len() <= 12 || !data.starts_with(b"HTTP/") {
            return BrowseStatus::NotHttp;
        }
        if &data[9..12] == b"200" {
            BrowseStatus::Ok
        } else {
            BrowseStatus::HttpError
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WebRequest<'a> {
    method: &'a str,
    path: &'a str,
    path_var: &'a str,
    host: &'a str,
    extra_header: Option<&'a str>,
    body: Option<&'a str>,
}

impl<'a> WebRequest<'a> {
    /// GET of `path` immediately followed by `path_var`, usually a query string.
    pub fn get(path: &'a str, path_var: &'a str, host: &'a str) -> Self {
        Self {
            method: "GET",
            path,
            path_var,
            host,
            extra_header: None,
            body: None,
        }
    }

    /// Sends the urlencoded `body` to `path` with POST, or with `method` when given.
    pub fn post(
        path: &'a str,
        host: &'a str,
        extra_header: Option<&'a str>,
        method: Option<&'a str>,
        body: &'a str,
    ) -> Self {
        Self {
            method: method.unwrap_or("POST"),
            path,
            path_var: "",
            host,
            extra_header,
            body: Some(body),
        }
    }

    /// Writes the request into `out`. `None` if it does not fit.
    pub fn write_to(&self, out: &mut [u8]) -> Option<usize> {
        let mut cursor = SliceCursor { buf: out, pos: 0 };
        self.format(&mut cursor).ok()?;
        Some(cursor.pos)
    }

    fn format(&self, w: &mut impl Write) -> fmt::Result {
        write!(w, "{} {}{} HTTP/1.1\r\nHost: {}\r\n", self.method, self.path, self.path_var, self.host)?;
        if let Some(header) = self.extra_header {
            write!(w, "{}\r\n", header)?;
        }
        write!(w, "User-Agent: {}\r\n", USER_AGENT)?;
        match self.body {
            None => w.write_str("Accept: text/html\r\nConnection: close\r\n\r\n"),
            Some(body) => write!(
                w,
                "Accept: */*\r\nConnection: close\r\n\
                 Content-Type: application/x-www-form-urlencoded\r\n\
                 Content-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
        }
    }
}

struct SliceCursor<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl Write for SliceCursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.pos + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.pos..end].copy_from_slice(s.as_bytes());
        self.pos = end;
        Ok(())
    }
}

/// Sends one request and reports the answer once through `on_response`.
pub struct WebClient<'a, F> {
    request: WebRequest<'a>,
    on_response: F,
    reported: bool,
}

impl<'a, F: FnMut(BrowseStatus, &[u8])> WebClient<'a, F> {
    pub fn new(request: WebRequest<'a>, on_response: F) -> Self {
        Self {
            request,
            on_response,
            reported: false,
        }
    }

    /// True once the callback has run.
    pub fn is_done(&self) -> bool {
        self.reported
    }

    fn report(&mut self, status: BrowseStatus, data: &[u8]) {
        if !self.reported {
            self.reported = true;
            (self.on_response)(status, data);
        }
    }
}

impl<F: FnMut(BrowseStatus, &[u8])> TcpHandler for WebClient<'_, F> {
    fn on_result(&mut self, conn_id: u8, status: TcpStatus, offset: usize, len: usize, frame: &[u8]) -> bool {
        if status != TcpStatus::Ok {
            warn!("[WWW] conn {} failed: {:?}", conn_id, status);
            self.report(BrowseStatus::NotHttp, &[]);
            return false;
        }
        if self.reported {
            debug!("[WWW] conn {}: {} more bytes", conn_id, len);
            return false;
        }
        let data = &frame[offset..offset + len];
        self.report(BrowseStatus::from_response(data), data);
        // The server closes after the response.
        false
    }

    fn fill_payload(&mut self, conn_id: u8, payload: &mut [u8]) -> usize {
        match self.request.write_to(payload) {
            Some(n) => {
                debug!("[WWW] conn {}: {} {}", conn_id, self.request.method, self.request.path);
                n
            }
            None => {
                warn!("[WWW] request for {} does not fit a segment", self.request.path);
                self.report(BrowseStatus::NotHttp, &[]);
                0
            }
        }
    }
}

impl<D: NetworkDriver, C: Clock, R: RngCore> NetStack<D, C, R> {
    /// Connects to the configured TCP server on `port`, sends `client`'s request and
    /// polls until the session is over.
    ///
    /// Every outcome, including a refused or silent server, ends in the callback; SYN
    /// retries and the idle timeout bound the wait.
    pub fn client_browse<F: FnMut(BrowseStatus, &[u8])>(
        &mut self,
        buf: &mut [u8],
        port: u16,
        client: &mut WebClient<'_, F>,
    ) -> Result<()> {
        self.tcp_active_open(buf, port)?;
        while self.tcp.state().is_busy() {
            self.poll(buf, client);
        }
        if !client.is_done() {
            client.report(BrowseStatus::NotHttp, &[]);
        }
        Ok(())
    }
}
