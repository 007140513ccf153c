//! Downstream server settings.

use serde::{Deserialize, Serialize};

/// Bind address and subscriber limits for the HTTP / WebSocket server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrent subscriber connections.
    pub max_connections: usize,
    /// Outbound queue size per subscriber connection.
    pub subscriber_queue_size: usize,
    /// Ping interval for subscriber connections in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// How long shutdown waits for relays to stop, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            max_connections: 256,
            subscriber_queue_size: 256,
            heartbeat_interval_ms: 30_000,
            shutdown_timeout_secs: 5,
        }
    }
}
