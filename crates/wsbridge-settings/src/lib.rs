//! # wsbridge-settings
//!
//! Configuration for the wsbridge process and its datasource instance.
//!
//! Process settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **User file**: `~/.wsbridge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WSBRIDGE_*` overrides (highest priority)
//!
//! Datasource connection settings (custom headers and query parameters) are
//! resolved once per instance by [`ConnectionSettings::resolve`].

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod loader;
pub mod types;

pub use connection::{ConnectionSettings, SETTING_NOT_FOUND};
pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.name, "wsbridge");
        assert_eq!(settings.server.port, 8090);
        assert_eq!(settings.relay.read_error_backoff_ms, 3000);
        assert_eq!(settings.relay.reconnect.max_retries, 1);
        assert_eq!(settings.logging.level, "info");
    }
}
