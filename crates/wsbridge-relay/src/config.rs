//! Runtime tuning for relay sessions.

use std::time::Duration;

use wsbridge_core::retry::RetryConfig;
use wsbridge_settings::RelaySettings;

/// Per-session tuning, derived from [`RelaySettings`].
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Capacity of the read loop → forward loop queue.
    pub queue_capacity: usize,
    /// Pause after a read error that is not a disconnect.
    pub read_error_backoff: Duration,
    /// Reconnect policy after the upstream goes away.
    pub reconnect: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&RelaySettings::default())
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity.max(1),
            read_error_backoff: Duration::from_millis(settings.read_error_backoff_ms),
            reconnect: settings.reconnect.clone(),
        }
    }
}
