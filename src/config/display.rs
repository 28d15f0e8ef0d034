//! Renders the effective configuration to the log once at startup, mirroring
//! the detail an operator would want to confirm before trusting a reload.

use std::fmt;

use crate::config::types::{ContentRule, ServerConfig};

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "network: {} via ports {:?}", self.host, self.ports)?;
        writeln!(f, "identity: {}", self.server_name)?;
        writeln!(
            f,
            "default: {}",
            if self.default_server { "yes" } else { "no" }
        )?;
        writeln!(
            f,
            "body limit: {} KiB, write-buffer cap: {} KiB",
            self.client_max_body_size / 1024,
            self.max_write_buffer_len / 1024
        )?;
        writeln!(
            f,
            "connections: {} total, {} per ip, idle timeout {}s",
            self.max_connections, self.max_connections_per_ip, self.idle_timeout_secs
        )?;

        if !self.error_pages.is_empty() {
            write!(f, "error pages:")?;
            for (code, path) in self.error_pages.iter() {
                write!(f, " {code}->{path}")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "content rules ({}):", self.rules.len())?;
        let mut sorted = self.rules.clone();
        sorted.sort_by(|a, b| a.url.cmp(&b.url));
        for rule in &sorted {
            writeln!(f, "  {}", RuleLine(rule))?;
        }
        Ok(())
    }
}

struct RuleLine<'a>(&'a ContentRule);

impl fmt::Display for RuleLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        write!(
            f,
            "{:?} {} [{}] -> {:?}",
            r.match_mode,
            r.url,
            r.methods.join("|"),
            r.handler
        )?;
        if r.requires_auth() {
            write!(f, " (basic-auth)")?;
        }
        Ok(())
    }
}

pub fn display_config(configs: &[ServerConfig]) {
    tracing::info!(server_blocks = configs.len(), "loaded configuration");
    for (i, server) in configs.iter().enumerate() {
        tracing::info!(block = i, "{}", server);
    }
}
