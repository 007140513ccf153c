//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial JSON
//! files deserialize with missing fields taking their default value.

mod relay;
mod server;

pub use relay::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the wsbridge process.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "relay": { "readErrorBackoffMs": 1000, "reconnect": { "maxRetries": 3 } }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Application name.
    pub name: String,
    /// HTTP / WebSocket server settings.
    pub server: ServerSettings,
    /// Upstream relay settings.
    pub relay: RelaySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            name: wsbridge_core::constants::NAME.to_string(),
            server: ServerSettings::default(),
            relay: RelaySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
