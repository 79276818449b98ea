// src/http.rs
use std::io::Write;

use log::{debug, info};
use tinystack::{TcpHandler, TcpStatus};

const PAGE: &str = "<html>\n\
<head><title>tinystack</title></head>\n\
<body style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">\n\
<h1>tinystack</h1>\n\
<p>Served over a single TCP session from one reused frame buffer.</p>\n\
<p>Requests so far: {count}</p>\n\
</body>\n\
</html>";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Pending {
    Nothing,
    Page,
    NotAllowed,
}

/// Answers every request with one small page and closes the connection.
pub struct HttpServer {
    pending: Pending,
    served: u64,
}

impl HttpServer {
    pub fn new() -> Self {
        Self {
            pending: Pending::Nothing,
            served: 0,
        }
    }

    fn write_response(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let capacity = out.len();
        let mut cursor = &mut out[..];
        match self.pending {
            Pending::Nothing => return Ok(0),
            Pending::Page => {
                let body = PAGE.replace("{count}", &self.served.to_string());
                write!(
                    cursor,
                    "HTTP/1.0 200 OK\r\n\
                     Content-Type: text/html\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\
                     Server: tinystack\r\n\
                     \r\n\
                     {}",
                    body.len(),
                    body
                )?;
            }
            Pending::NotAllowed => {
                write!(cursor, "HTTP/1.0 405 Method Not Allowed\r\nConnection: close\r\n\r\n")?;
            }
        }
        Ok(capacity - cursor.len())
    }
}

impl TcpHandler for HttpServer {
    fn on_result(&mut self, conn_id: u8, status: TcpStatus, offset: usize, len: usize, frame: &[u8]) -> bool {
        if status != TcpStatus::Ok {
            debug!("[HTTP] conn {} ended with status {}", conn_id, status.code());
            self.pending = Pending::Nothing;
            return false;
        }
        let Some(request) = frame.get(offset..offset + len) else {
            return false;
        };
        if request.starts_with(b"GET ") {
            self.served += 1;
            self.pending = Pending::Page;
            let line_end = request.iter().position(|&b| b == b'\r').unwrap_or(request.len());
            info!("[HTTP] conn {}: {}", conn_id, String::from_utf8_lossy(&request[..line_end]));
        } else {
            self.pending = Pending::NotAllowed;
        }
        // HTTP/1.0: the response ends the connection.
        true
    }

    fn fill_payload(&mut self, conn_id: u8, payload: &mut [u8]) -> usize {
        let written = match self.write_response(payload) {
            Ok(n) => n,
            Err(e) => {
                debug!("[HTTP] conn {}: response truncated: {}", conn_id, e);
                payload.len()
            }
        };
        self.pending = Pending::Nothing;
        written
    }
}
