//! Server configuration.

use std::time::Duration;

use wsbridge_settings::ServerSettings;

/// Configuration for the bridge server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent subscriber connections.
    pub max_connections: usize,
    /// Outbound queue size per subscriber.
    pub subscriber_queue_size: usize,
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which a subscriber is considered dead.
    pub heartbeat_timeout: Duration,
    /// How long shutdown waits for relays to stop.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from(&ServerSettings::default())
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        let heartbeat_interval = Duration::from_millis(settings.heartbeat_interval_ms.max(1));
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            subscriber_queue_size: settings.subscriber_queue_size.max(1),
            heartbeat_interval,
            heartbeat_timeout: heartbeat_interval * 2,
            shutdown_timeout: Duration::from_secs(settings.shutdown_timeout_secs),
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
