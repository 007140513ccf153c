//! Upstream relay settings.

use serde::{Deserialize, Serialize};
use wsbridge_core::retry::RetryConfig;

/// Tuning for relay sessions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Capacity of the queue between the read loop and the forward loop.
    pub queue_capacity: usize,
    /// Pause after a non-disconnect read error, in milliseconds.
    pub read_error_backoff_ms: u64,
    /// Reconnect policy after the upstream goes away.
    pub reconnect: RetryConfig,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            read_error_backoff_ms: 3000,
            reconnect: RetryConfig::default(),
        }
    }
}
