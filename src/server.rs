//! The event loop: binds listeners, accepts connections into a slab-backed
//! table, and drives each [`Connection`] from `mio` readiness events.
//!
//! Scheduling is single-threaded and cooperative — one `Poll`, one thread,
//! no locks. Every connection's readable/writable handling runs to
//! completion (or `WouldBlock`) before the next event is serviced.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use crate::config::types::ServerConfig;
use crate::connection::Connection;
use crate::error::{EngineError, Result};
use crate::handlers::dynamic::DynamicRegistry;

/// A bound listener and the indices (into the full server-block list) of
/// every `ServerConfig` that shares it — virtual hosting on one socket.
struct Listener {
    socket: TcpListener,
    candidates: Vec<usize>,
}

pub struct Server {
    configs: Vec<ServerConfig>,
    registry: DynamicRegistry,
    listeners: Slab<Listener>,
    connections: Slab<Connection>,
    conns_per_ip: HashMap<IpAddr, usize>,
    max_connections: usize,
    idle_timeout: Duration,
    poll: Poll,
}

/// First `Token` value handed to a connection; listener tokens occupy the
/// range below it so a token's origin can be told apart by a single compare.
const LISTENER_TOKEN_CEILING: usize = 1024;

impl Server {
    pub fn new(configs: Vec<ServerConfig>, registry: DynamicRegistry) -> Result<Self> {
        let poll = Poll::new().map_err(EngineError::Poll)?;
        let max_connections = configs.iter().map(|c| c.max_connections).max().unwrap_or(1024);
        let idle_timeout = Duration::from_secs(
            configs.iter().map(|c| c.idle_timeout_secs).max().unwrap_or(60),
        );

        let mut server = Server {
            configs,
            registry,
            listeners: Slab::new(),
            connections: Slab::new(),
            conns_per_ip: HashMap::new(),
            max_connections,
            idle_timeout,
            poll,
        };
        server.bind_listeners()?;
        Ok(server)
    }

    /// Groups server blocks by the `(ip, port)` pairs they bind and opens one
    /// listener per pair, wired to every block that shares it.
    fn bind_listeners(&mut self) -> Result<()> {
        let mut by_addr: HashMap<SocketAddr, Vec<usize>> = HashMap::new();

        for (idx, config) in self.configs.iter().enumerate() {
            for &port in &config.ports {
                if !config.host.is_empty() {
                    let ip: IpAddr = config.host.parse()?;
                    by_addr.entry(SocketAddr::new(ip, port)).or_default().push(idx);
                }
                if !config.host6.is_empty() {
                    let ip: Ipv6Addr = config.host6.parse()?;
                    by_addr
                        .entry(SocketAddr::new(IpAddr::V6(ip), port))
                        .or_default()
                        .push(idx);
                }
            }
        }

        for (addr, candidates) in by_addr {
            let mut socket = TcpListener::bind(addr).map_err(|source| EngineError::Bind {
                addr: addr.to_string(),
                source,
            })?;
            let entry = self.listeners.vacant_entry();
            let token = Token(entry.key());
            self.poll
                .registry()
                .register(&mut socket, token, Interest::READABLE)
                .map_err(EngineError::Poll)?;
            entry.insert(Listener { socket, candidates });
            tracing::info!(%addr, "listening");
        }

        if self.listeners.is_empty() {
            return Err(EngineError::NoValidServers);
        }
        if self.listeners.len() > LISTENER_TOKEN_CEILING {
            return Err(EngineError::Poll(std::io::Error::other(
                "too many listeners for the reserved token range",
            )));
        }
        Ok(())
    }

    /// Runs until `shutdown` is set (by a signal handler).
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        while !shutdown.load(Ordering::Relaxed) {
            let timeout = Some(self.idle_timeout.min(Duration::from_secs(1)));
            match self.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EngineError::Poll(e)),
            }

            for event in events.iter() {
                let token = event.token();
                if token.0 < LISTENER_TOKEN_CEILING {
                    if self.listeners.contains(token.0) {
                        self.accept_all(token);
                    }
                } else {
                    let slab_key = token.0 - LISTENER_TOKEN_CEILING;
                    if self.connections.contains(slab_key) {
                        self.service(slab_key);
                    }
                }
            }

            self.reap_idle();
        }
        Ok(())
    }

    fn accept_all(&mut self, token: Token) {
        loop {
            let accepted = {
                let listener = &self.listeners[token.0];
                listener.socket.accept()
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    return;
                }
            };

            let candidates = self.listeners[token.0].candidates.clone();
            let server = &self.configs[candidates[0]];

            if self.connections.len() >= self.max_connections {
                tracing::debug!(%peer, "connection rejected: global capacity reached");
                Self::reject(stream);
                continue;
            }
            let per_ip = self.conns_per_ip.get(&peer.ip()).copied().unwrap_or(0);
            if server.max_connections_per_ip > 0 && per_ip >= server.max_connections_per_ip {
                tracing::debug!(%peer, "connection rejected: per-ip capacity reached");
                Self::reject(stream);
                continue;
            }

            let mut conn = Connection::new(stream, Token(0), server, candidates);
            let entry = self.connections.vacant_entry();
            let conn_token = Token(LISTENER_TOKEN_CEILING + entry.key());
            conn.token = conn_token;
            match self.poll.registry().register(&mut conn.stream, conn_token, conn.interest()) {
                Ok(()) => {
                    *self.conns_per_ip.entry(peer.ip()).or_insert(0) += 1;
                    tracing::debug!(%peer, token = conn_token.0, "accepted");
                    entry.insert(conn);
                }
                Err(e) => tracing::warn!(error = %e, "failed to register connection"),
            }
        }
    }

    /// Writes a bare 503 to a socket that has no free slot, then drops it.
    /// Plain bytes on the raw stream: the write chain and request parser
    /// exist per-connection and this socket was never admitted to the table.
    fn reject(stream: mio::net::TcpStream) {
        use std::io::Write;
        let body = b"503 Service Unavailable\n";
        let resp = format!(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let mut stream = stream;
        let _ = stream.write_all(resp.as_bytes());
        let _ = stream.write_all(body);
        let _ = stream.shutdown(std::net::Shutdown::Both);
    }

    fn service(&mut self, slab_key: usize) {
        let alive = {
            let conn = &mut self.connections[slab_key];
            let readable = conn.interest() == Interest::READABLE;
            let ok = if readable {
                conn.handle_readable(&self.configs, &self.registry)
            } else {
                conn.handle_writable(&self.configs, &self.registry)
            };
            ok && conn.reregister(self.poll.registry()).is_ok()
        };
        if !alive {
            self.close(slab_key);
        }
    }

    fn close(&mut self, slab_key: usize) {
        let mut conn = self.connections.remove(slab_key);
        let peer = conn.stream.peer_addr().ok();
        let _ = self.poll.registry().deregister(&mut conn.stream);
        conn.shutdown();
        if let Some(peer) = peer {
            if let Some(count) = self.conns_per_ip.get_mut(&peer.ip()) {
                *count -= 1;
                if *count == 0 {
                    self.conns_per_ip.remove(&peer.ip());
                }
            }
        }
    }

    /// Sweeps the connection table for idle timeouts at each wakeup.
    fn reap_idle(&mut self) {
        let now = Instant::now();
        let timed_out: Vec<usize> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_idle_timed_out(now, self.idle_timeout))
            .map(|(key, _)| key)
            .collect();
        for key in timed_out {
            tracing::debug!(key, "closing idle connection");
            self.close(key);
        }
    }
}

/// Installs SIGINT/SIGTERM handlers that flip a shared flag rather than
/// unwinding from inside a signal handler; the event loop checks it once per
/// wakeup so shutdown happens between readiness events, not mid-request.
pub fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))
        .map_err(EngineError::Signal)?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))
        .map_err(EngineError::Signal)?;
    Ok(flag)
}
