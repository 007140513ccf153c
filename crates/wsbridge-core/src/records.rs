//! Records published to channel subscribers.
//!
//! Every upstream payload becomes a data record stamped with its receipt time.
//! Read failures become error records. On the wire:
//!
//! ```json
//! {"time": "2026-01-01T00:00:00Z", "data": "<raw payload>"}
//! {"error": "Disconnection Error: going away"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of output for a channel's subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamRecord {
    /// A raw upstream payload.
    Data {
        /// When the relay received the payload.
        time: DateTime<Utc>,
        /// The payload, verbatim.
        data: String,
    },
    /// A relay-side failure visible to subscribers.
    Error {
        /// Human-readable failure message.
        error: String,
    },
}

impl StreamRecord {
    /// Wrap a payload received now.
    #[must_use]
    pub fn data(payload: impl Into<String>) -> Self {
        Self::Data {
            time: Utc::now(),
            data: payload.into(),
        }
    }

    /// Build an error record.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Whether this is an error record.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The payload of a data record.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Data { data, .. } => Some(data),
            Self::Error { .. } => None,
        }
    }

    /// Serialize to the JSON wire shape.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
