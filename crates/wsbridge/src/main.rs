//! # wsbridge
//!
//! Bridge server binary: loads settings and one datasource instance, then
//! serves its channels over HTTP/WebSocket until Ctrl-C.

#![deny(unsafe_code)]

mod instance;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use wsbridge_relay::{RelayConfig, TungsteniteConnector};
use wsbridge_server::{BridgeServer, DataSourceInstance, ServerConfig};
use wsbridge_settings::BridgeSettings;

use crate::instance::{InstanceFile, default_instance_path};

/// WebSocket upstream to channel bridge.
#[derive(Parser, Debug)]
#[command(name = "wsbridge", version, about = "Relay upstream WebSocket feeds to channel subscribers")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.wsbridge/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Datasource instance file (default `~/.wsbridge/instance.json`).
    #[arg(long)]
    instance: Option<PathBuf>,

    /// Log level filter (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,
}

/// Apply command-line overrides to loaded settings.
fn apply_cli(mut settings: BridgeSettings, args: &Cli) -> BridgeSettings {
    if let Some(host) = &args.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(level) = &args.log_level {
        settings.logging.level.clone_from(level);
    }
    settings
}

/// Build the server for one instance file.
fn build_server(settings: &BridgeSettings, instance: &InstanceFile) -> Result<BridgeServer> {
    let datasource = DataSourceInstance::new(
        instance.uid.clone(),
        &instance.raw_json(),
        &instance.decrypted_secure_json_data,
        Arc::new(TungsteniteConnector::new()),
        RelayConfig::from(&settings.relay),
    )
    .context("Failed to create datasource instance")?;
    Ok(BridgeServer::new(ServerConfig::from(&settings.server), datasource))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(wsbridge_settings::settings_path);
    let settings = wsbridge_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    let settings = apply_cli(settings, &args);

    wsbridge_core::logging::init_subscriber(&settings.logging.level);

    let instance_path = args.instance.clone().unwrap_or_else(default_instance_path);
    let instance = InstanceFile::load(&instance_path)?;
    let server = build_server(&settings, &instance)?;

    let health = server.instance().check_health();
    tracing::info!(uid = %instance.uid, status = ?health.status, message = %health.message, "datasource loaded");

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("wsbridge listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
