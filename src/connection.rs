//! Per-connection state machine.
//!
//! A connection cycles `Reading -> Writing -> Reading` for as many requests
//! as keep-alive allows, then `Closing`. Reading pulls bytes off the socket
//! and feeds them to the request parser; once a request completes it is
//! dispatched synchronously and the response handed to the write chain.
//! There is no concurrent in-flight request per socket — the next request's
//! bytes may already be buffered (simple pipelining) but are not parsed
//! until the current response has fully drained.

use std::io::{self, Read};
use std::net::Shutdown;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::config::types::ServerConfig;
use crate::dispatcher::{self, DispatchOutcome};
use crate::error::ConnError;
use crate::handlers::dynamic::DynamicRegistry;
use crate::handlers::error_page;
use crate::http::request::HttpRequest;
use crate::writechain::WriteChain;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Reading,
    Writing,
    /// Half-closed: output drained (or draining), no further requests will
    /// be accepted. The socket is torn down once the peer hangs up or the
    /// write chain empties, whichever this state is entered after.
    Closing,
}

pub struct Connection {
    pub stream: TcpStream,
    pub token: Token,
    pub state: ConnState,
    pub last_activity: Instant,
    /// Indices into the full server-block list naming the blocks bound to
    /// the listener this connection was accepted on; the `Host` header picks
    /// one of them (virtual hosting) once the request line is parsed.
    pub candidates: Vec<usize>,
    request: HttpRequest,
    write_chain: WriteChain,
    keep_alive: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, token: Token, server: &ServerConfig, candidates: Vec<usize>) -> Self {
        Connection {
            stream,
            token,
            state: ConnState::Reading,
            last_activity: Instant::now(),
            candidates,
            request: HttpRequest::new(
                server.max_request_line_len,
                server.max_header_len,
                server.client_max_body_size,
            ),
            write_chain: WriteChain::new(server.max_write_buffer_len),
            keep_alive: true,
        }
    }

    pub fn interest(&self) -> Interest {
        match self.state {
            ConnState::Reading => Interest::READABLE,
            ConnState::Writing | ConnState::Closing => Interest::WRITABLE,
        }
    }

    pub fn reregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.reregister(&mut self.stream, self.token, self.interest())
    }

    pub fn is_idle_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_activity) > timeout
    }

    pub fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Services a readable event: reads what's available, advances the
    /// parser, and dispatches once a request is complete. Returns `false` if
    /// the connection must be torn down (peer closed, unrecoverable error).
    pub fn handle_readable(&mut self, configs: &[ServerConfig], registry: &DynamicRegistry) -> bool {
        self.last_activity = Instant::now();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return false,
                Ok(n) => {
                    self.request.feed(&buf[..n]);
                    match self.request.parse() {
                        Ok(()) => {
                            self.dispatch_and_queue(configs, registry);
                            return true;
                        }
                        Err(ConnError::Incomplete) => continue,
                        Err(e) => {
                            self.queue_error(configs, &e);
                            return true;
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return false,
            }
        }
    }

    /// Services a writable event: drains the write chain, then either
    /// advances to the next pipelined request (if already buffered) or goes
    /// back to waiting for more input. Returns `false` once the connection
    /// should close.
    pub fn handle_writable(&mut self, configs: &[ServerConfig], registry: &DynamicRegistry) -> bool {
        self.last_activity = Instant::now();
        match self.write_chain.drain_into(&self.stream) {
            Ok(false) => true,
            Err(_) => false,
            Ok(true) => {
                if self.state == ConnState::Closing || !self.keep_alive {
                    return false;
                }
                self.request.reset_for_next_request();
                self.state = ConnState::Reading;
                if self.request.has_unconsumed_bytes() {
                    match self.request.parse() {
                        Ok(()) => self.dispatch_and_queue(configs, registry),
                        Err(ConnError::Incomplete) => {}
                        Err(e) => self.queue_error(configs, &e),
                    }
                }
                true
            }
        }
    }

    fn resolve<'a>(&self, configs: &'a [ServerConfig]) -> &'a ServerConfig {
        dispatcher::resolve_server(configs, &self.candidates, self.request.header_value("host", 0))
    }

    fn dispatch_and_queue(&mut self, configs: &[ServerConfig], registry: &DynamicRegistry) {
        self.keep_alive = wants_keep_alive(&self.request);
        let server = self.resolve(configs);
        let outcome = dispatcher::dispatch(server, &self.request, registry);
        self.queue_outcome(server, outcome);
    }

    fn queue_outcome(&mut self, server: &ServerConfig, outcome: DispatchOutcome) {
        let queued = match outcome {
            DispatchOutcome::Response(resp) => {
                let bytes = resp.to_bytes(&server.extra_headers);
                self.write_chain.push_owned(bytes)
            }
            DispatchOutcome::File { headers, file, len } => {
                let header_bytes = headers.to_bytes_headers_only(&server.extra_headers);
                self.write_chain
                    .push_owned(header_bytes)
                    .and_then(|()| self.write_chain.push_file(file, 0, len, true))
            }
        };
        self.state = if queued.is_err() {
            ConnState::Closing
        } else {
            ConnState::Writing
        };
    }

    fn queue_error(&mut self, configs: &[ServerConfig], err: &ConnError) {
        self.keep_alive = false;
        let Some(code) = err.status_code() else {
            self.state = ConnState::Closing;
            return;
        };
        let server = self.resolve(configs);
        let resp = error_page::build(code, server);
        let bytes = resp.to_bytes(&server.extra_headers);
        let _ = self.write_chain.push_owned(bytes);
        self.state = ConnState::Writing;
    }
}

fn wants_keep_alive(request: &HttpRequest) -> bool {
    match request.header_value("connection", 0) {
        Some(v) if v.eq_ignore_ascii_case("close") => false,
        Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
        _ => request.version == "HTTP/1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::HttpRequest;

    fn req_1_0() -> HttpRequest {
        let mut r = HttpRequest::new(8192, 16384, 1024);
        r.feed(b"GET / HTTP/1.0\r\n\r\n");
        r.parse().unwrap();
        r
    }

    fn req_1_1() -> HttpRequest {
        let mut r = HttpRequest::new(8192, 16384, 1024);
        r.feed(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        r.parse().unwrap();
        r
    }

    #[test]
    fn http_1_0_defaults_to_close() {
        assert!(!wants_keep_alive(&req_1_0()));
    }

    #[test]
    fn http_1_1_defaults_to_keep_alive() {
        assert!(wants_keep_alive(&req_1_1()));
    }

    #[test]
    fn explicit_connection_close_overrides_version_default() {
        let mut r = HttpRequest::new(8192, 16384, 1024);
        r.feed(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
        r.parse().unwrap();
        assert!(!wants_keep_alive(&r));
    }

    #[test]
    fn explicit_connection_keep_alive_overrides_1_0_default() {
        let mut r = HttpRequest::new(8192, 16384, 1024);
        r.feed(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
        r.parse().unwrap();
        assert!(wants_keep_alive(&r));
    }
}
