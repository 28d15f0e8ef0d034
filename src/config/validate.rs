//! Cross-checks applied to the full set of server blocks after parsing,
//! before any of them are bound.
//!
//! Two classes of problem are distinguished:
//! - **Conflicts** (duplicate `host:port` + name, or a wildcard bind mixed
//!   with a specific one on the same port) make the configuration
//!   ambiguous or unbindable as written, so they are hard validation
//!   errors that name the offending blocks and abort startup.
//! - **Per-block defects** (a referenced error page or route root that
//!   doesn't exist) only invalidate the block that has them; that block is
//!   dropped with a warning and the rest of the configuration still starts.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::types::ServerConfig;

#[derive(Debug)]
pub enum ConfigValidationError {
    DuplicateBinding {
        host: String,
        port: u16,
        server_name: String,
    },
    WildcardConflict {
        port: u16,
        hosts: Vec<String>,
    },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValidationError::DuplicateBinding {
                host,
                port,
                server_name,
            } => write!(
                f,
                "multiple server blocks bind {host}:{port} with server_name '{server_name}'"
            ),
            ConfigValidationError::WildcardConflict { port, hosts } => write!(
                f,
                "port {port} mixes wildcard bind '0.0.0.0' with specific host(s) {hosts:?}"
            ),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Returns the subset of `configs` that passed per-block checks, or an error
/// naming the first hard conflict found across the whole set.
pub fn validate_configs(
    configs: Vec<ServerConfig>,
) -> Result<Vec<ServerConfig>, ConfigValidationError> {
    let mut usage_map: HashMap<(String, u16, String), usize> = HashMap::new();
    for config in &configs {
        for port in &config.ports {
            let key = (config.host.clone(), *port, config.server_name.clone());
            if let Some(_) = usage_map.insert(key.clone(), 1) {
                return Err(ConfigValidationError::DuplicateBinding {
                    host: key.0,
                    port: key.1,
                    server_name: key.2,
                });
            }
        }
    }

    let mut port_hosts: HashMap<u16, HashSet<String>> = HashMap::new();
    for config in &configs {
        for port in &config.ports {
            port_hosts.entry(*port).or_default().insert(config.host.clone());
        }
    }
    for (port, hosts) in &port_hosts {
        if hosts.contains("0.0.0.0") && hosts.len() > 1 {
            let mut hosts: Vec<String> = hosts.iter().cloned().collect();
            hosts.sort();
            return Err(ConfigValidationError::WildcardConflict { port: *port, hosts });
        }
    }

    let mut valid = Vec::with_capacity(configs.len());
    for config in configs {
        if block_is_sound(&config) {
            valid.push(config);
        }
    }
    Ok(valid)
}

fn block_is_sound(config: &ServerConfig) -> bool {
    let mut sound = true;

    for (code, path) in config.error_pages.iter() {
        if *code < 100 || *code > 599 {
            tracing::warn!(
                server_name = %config.server_name,
                code,
                "dropping server block: error page status code out of range 100-599"
            );
            sound = false;
            continue;
        }
        if let Err(e) = std::fs::File::open(path) {
            tracing::warn!(
                server_name = %config.server_name,
                code,
                path,
                error = %e,
                "dropping server block: error page file unreadable"
            );
            sound = false;
        }
    }

    for rule in &config.rules {
        if rule.handler == crate::config::types::HandlerKind::Disk {
            if let Err(e) = std::fs::read_dir(&rule.root) {
                tracing::warn!(
                    server_name = %config.server_name,
                    url = %rule.url,
                    root = %rule.root,
                    error = %e,
                    "dropping server block: rule root directory unreadable"
                );
                sound = false;
            }
        }
    }

    sound
}
