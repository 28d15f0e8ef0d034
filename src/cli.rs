//! Command-line flags and their merge onto the parsed configuration.
//!
//! Precedence is CLI > config file > compiled-in default. Every flag here is
//! a *global* override applied to every server block rather than addressed
//! to one, matching the flag table's framing as machine-wide bind/limit
//! knobs rather than per-virtual-host settings.

use clap::Parser;

use crate::config::types::ServerConfig;

#[derive(Debug, Parser)]
#[command(name = "originserver", about = "A single-threaded HTTP/1.1 origin server")]
pub struct Cli {
    /// Drop privileges to this user after binding.
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// chroot into this directory after binding, before dropping privileges.
    #[arg(short = 'c', long)]
    pub chroot: Option<String>,

    /// IPv4 bind address, overriding every server block's `host`.
    #[arg(short = 'i', long)]
    pub ip: Option<String>,

    /// IPv6 bind address, overriding every server block's `host6`.
    #[arg(short = 'I', long)]
    pub ip6: Option<String>,

    /// Bind port, overriding every server block's `ports`.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Max total connections, overriding every server block's `max_connections`.
    #[arg(short = 'C', long)]
    pub maxconn: Option<usize>,

    /// Max request body bytes, overriding `client_max_body_size`.
    #[arg(short = 'm', long)]
    pub maxbodylen: Option<usize>,

    /// Max write-buffer bytes, overriding `max_write_buffer_len`.
    #[arg(short = 'M', long)]
    pub maxwblen: Option<usize>,

    /// Idle timeout in seconds, overriding `idle_timeout_secs`.
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Path to the YAML configuration file.
    #[arg(long)]
    pub config: Option<String>,
}

impl Cli {
    /// Applies every flag the user actually passed onto every server block.
    /// Flags left unset leave the config-file (or struct default) value in
    /// place — this is a merge, not a replace.
    pub fn apply(&self, configs: &mut [ServerConfig]) {
        for config in configs.iter_mut() {
            if let Some(ip) = &self.ip {
                config.host = ip.clone();
            }
            if let Some(ip6) = &self.ip6 {
                config.host6 = ip6.clone();
            }
            if let Some(port) = self.port {
                config.ports = vec![port];
            }
            if let Some(maxconn) = self.maxconn {
                config.max_connections = maxconn;
            }
            if let Some(maxbodylen) = self.maxbodylen {
                config.client_max_body_size = maxbodylen;
            }
            if let Some(maxwblen) = self.maxwblen {
                config.max_write_buffer_len = maxwblen;
            }
            if let Some(timeout) = self.timeout {
                config.idle_timeout_secs = timeout;
            }
        }
    }
}
