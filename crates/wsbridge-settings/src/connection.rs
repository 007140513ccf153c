//! Datasource connection settings.
//!
//! A datasource instance carries two maps: a plain JSON object (`jsonData`)
//! naming custom headers and query parameters, and a decrypted secret map
//! holding their values. Names and values are paired by key convention:
//!
//! | jsonData key        | secret key            |
//! |---------------------|-----------------------|
//! | `headerName1`       | `headerValue1`        |
//! | `queryParamNameKey` | `queryParamValueKey`  |
//!
//! [`ConnectionSettings::resolve`] does the pairing once per instance. The
//! result is immutable and shared by every relay session of that instance.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::debug;
use wsbridge_core::errors::RelayError;

/// Value used when a header or query parameter name has no matching secret.
pub const SETTING_NOT_FOUND: &str = "custom setting not found";

const HEADER_PREFIX: &str = "headerName";
const QUERY_PARAM_PREFIX: &str = "queryParamName";
const NAME_SEGMENT: &str = "Name";
const VALUE_SEGMENT: &str = "Value";

/// Legacy secret attached as the `x-api-key` query parameter.
const API_KEY_SECRET: &str = "apiKey";
const API_KEY_PARAM: &str = "x-api-key";

/// Resolved, typed connection settings for one datasource instance.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Upstream base URL (`url` key, falling back to `host`).
    pub base_url: String,
    /// Headers sent on every upstream handshake.
    pub custom_headers: BTreeMap<String, String>,
    /// Query parameters appended to every upstream URL.
    pub custom_query_parameters: BTreeMap<String, String>,
}

impl ConnectionSettings {
    /// Resolve settings from raw instance JSON and the decrypted secret map.
    ///
    /// Fails only when `raw_json` is not a JSON object of string values. An
    /// empty input is treated as `{}`. Missing secrets yield
    /// [`SETTING_NOT_FOUND`] rather than an error. When several keys name the
    /// same header or parameter, the key that sorts first wins.
    pub fn resolve(raw_json: &str, secrets: &HashMap<String, String>) -> Result<Self, RelayError> {
        let json_data: BTreeMap<String, String> = if raw_json.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(raw_json)
                .map_err(|e| RelayError::malformed_config(format!("expected a flat string map: {e}")))?
        };

        let mut settings = Self {
            base_url: json_data
                .get("url")
                .or_else(|| json_data.get("host"))
                .cloned()
                .unwrap_or_default(),
            ..Self::default()
        };

        for (key, name) in &json_data {
            let target = if key.starts_with(HEADER_PREFIX) {
                &mut settings.custom_headers
            } else if key.starts_with(QUERY_PARAM_PREFIX) {
                &mut settings.custom_query_parameters
            } else {
                continue;
            };
            if name.trim().is_empty() {
                debug!(key = %key, "skipping custom setting with empty name");
                continue;
            }
            let value = secrets
                .get(&value_key(key))
                .cloned()
                .unwrap_or_else(|| SETTING_NOT_FOUND.to_string());
            match target.entry(name.clone()) {
                Entry::Vacant(slot) => {
                    let _ = slot.insert(value);
                }
                Entry::Occupied(_) => {
                    debug!(key = %key, name = %name, "duplicate custom setting name ignored");
                }
            }
        }

        if let Some(api_key) = secrets.get(API_KEY_SECRET).filter(|v| !v.is_empty()) {
            let _ = settings
                .custom_query_parameters
                .entry(API_KEY_PARAM.to_string())
                .or_insert_with(|| api_key.clone());
        }

        debug!(
            headers = settings.custom_headers.len(),
            query_params = settings.custom_query_parameters.len(),
            "resolved connection settings"
        );
        Ok(settings)
    }
}

/// Secret key holding the value for a name key: the first `Name` becomes `Value`.
fn value_key(name_key: &str) -> String {
    name_key.replacen(NAME_SEGMENT, VALUE_SEGMENT, 1)
}

/// Values are secrets; only names are printed.
impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("base_url", &self.base_url)
            .field("custom_headers", &self.custom_headers.keys().collect::<Vec<_>>())
            .field(
                "custom_query_parameters",
                &self.custom_query_parameters.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
