//! Relay session lifecycle.

use std::fmt;

use serde::Serialize;

/// Lifecycle of a relay session.
///
/// `Connecting → Streaming ⇄ Reconnecting → Closed`. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    /// Building the URL and dialing the first connection.
    Connecting,
    /// Reading from upstream and forwarding records.
    Streaming,
    /// The upstream went away; dialing a replacement.
    Reconnecting,
    /// Torn down. No further records are published.
    Closed,
}

impl RelayState {
    /// Whether the session has been torn down.
    #[must_use]
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}
