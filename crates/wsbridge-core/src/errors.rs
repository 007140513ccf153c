//! Error taxonomy for the relay.
//!
//! [`RelayError`] covers every failure the relay can observe, from instance
//! creation through streaming. Creation-time variants propagate to the caller;
//! runtime variants surface downstream as error records and in logs.

use thiserror::Error;

/// Errors raised while building, running, or publishing from a relay session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Instance JSON is not a flat object of string values.
    #[error("failed reading datasource settings: {reason}")]
    MalformedConfig {
        /// Why the settings were rejected.
        reason: String,
    },

    /// The base URL does not parse as an absolute URL.
    #[error("invalid host '{url}': {reason}")]
    InvalidHost {
        /// The configured base URL.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// WebSocket dial or handshake failed.
    #[error("connection error: {reason}")]
    Connect {
        /// Transport or handshake diagnostic.
        reason: String,
    },

    /// Every reconnect attempt after a disconnect failed.
    #[error("Reconnection Error: {reason}")]
    ReconnectFailed {
        /// Number of attempts made.
        attempts: u32,
        /// Diagnostic from the last attempt.
        reason: String,
    },

    /// A read failed for a reason other than the peer going away.
    #[error("Read WebSocket Error: {reason}")]
    TransientRead {
        /// Read diagnostic.
        reason: String,
    },

    /// The upstream peer closed the connection as going away.
    #[error("Disconnection Error: {reason}")]
    Disconnected {
        /// Close reason reported by the peer or transport.
        reason: String,
    },

    /// The downstream sender rejected a record.
    #[error("publish error: {reason}")]
    Publish {
        /// Sender diagnostic.
        reason: String,
    },
}

impl RelayError {
    /// Create a [`RelayError::MalformedConfig`].
    #[must_use]
    pub fn malformed_config(reason: impl Into<String>) -> Self {
        Self::MalformedConfig {
            reason: reason.into(),
        }
    }

    /// Create a [`RelayError::Connect`].
    #[must_use]
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect {
            reason: reason.into(),
        }
    }

    /// Create a [`RelayError::TransientRead`].
    #[must_use]
    pub fn transient_read(reason: impl Into<String>) -> Self {
        Self::TransientRead {
            reason: reason.into(),
        }
    }

    /// Create a [`RelayError::Disconnected`].
    #[must_use]
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    /// Create a [`RelayError::Publish`].
    #[must_use]
    pub fn publish(reason: impl Into<String>) -> Self {
        Self::Publish {
            reason: reason.into(),
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedConfig { .. } => "MALFORMED_CONFIG",
            Self::InvalidHost { .. } => "INVALID_HOST",
            Self::Connect { .. } => "CONNECT_ERROR",
            Self::ReconnectFailed { .. } => "RECONNECT_FAILED",
            Self::TransientRead { .. } => "TRANSIENT_READ",
            Self::Disconnected { .. } => "DISCONNECTED",
            Self::Publish { .. } => "PUBLISH_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_record_prefixes() {
        assert_eq!(
            RelayError::disconnected("going away").to_string(),
            "Disconnection Error: going away"
        );
        assert_eq!(
            RelayError::transient_read("bad frame").to_string(),
            "Read WebSocket Error: bad frame"
        );
        let err = RelayError::ReconnectFailed {
            attempts: 2,
            reason: "refused".into(),
        };
        assert_eq!(err.to_string(), "Reconnection Error: refused");
    }

    #[test]
    fn invalid_host_display() {
        let err = RelayError::InvalidHost {
            url: "::nope".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid host '::nope': relative URL without a base"
        );
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            RelayError::malformed_config("x"),
            RelayError::InvalidHost {
                url: String::new(),
                reason: String::new(),
            },
            RelayError::connect("x"),
            RelayError::ReconnectFailed {
                attempts: 1,
                reason: String::new(),
            },
            RelayError::transient_read("x"),
            RelayError::disconnected("x"),
            RelayError::publish("x"),
        ];
        let mut codes: Vec<_> = errors.iter().map(RelayError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
