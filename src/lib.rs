//! Library surface for `originserver`: a single-threaded, non-blocking
//! HTTP/1.1 origin server built on `mio`.
//!
//! `main.rs` is a thin shell around [`run`]; everything else lives here so
//! integration tests can exercise the parser, dispatcher, and config layers
//! directly without spawning the binary.

pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod http;
pub mod mime;
pub mod privilege;
pub mod server;
pub mod writechain;

use std::fs;

use clap::Parser;

use cli::Cli;
use config::{display_config, validate_configs, AppConfig, FromYaml};
use error::{EngineError, Result};
use handlers::dynamic::DynamicRegistry;
use server::Server;

/// Parses arguments and the config file, merges them, validates the result,
/// drops privileges if requested, then runs the event loop until a shutdown
/// signal arrives. `registry` lets the embedding binary wire up application
/// handlers before the loop starts; pass `DynamicRegistry::new()` for none.
pub fn run(registry: DynamicRegistry) -> Result<()> {
    let cli = Cli::parse();

    let app_config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
                path: path.clone(),
                source,
            })?;
            AppConfig::from_str(&text)?
        }
        None => AppConfig::default(),
    };

    let mut configs = app_config.servers;
    if configs.is_empty() {
        configs.push(config::ServerConfig::default());
    }
    cli.apply(&mut configs);

    let configs = validate_configs(configs)?;
    if configs.is_empty() {
        return Err(EngineError::NoValidServers);
    }
    display_config(&configs);

    let mut server = Server::new(configs, registry)?;

    let user = cli.user.as_deref().unwrap_or(&app_config.user);
    let chroot_dir = cli.chroot.as_deref().unwrap_or(&app_config.chroot);
    privilege::apply(chroot_dir, user)?;

    let shutdown = server::shutdown_flag()?;
    server.run(&shutdown)?;
    tracing::info!("shutdown requested, exiting");
    Ok(())
}
