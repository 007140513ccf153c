//! # wsbridge-relay
//!
//! One relay session bridges one upstream WebSocket to one streaming channel.
//!
//! - [`endpoint`]: target URL assembly (path join, sorted query parameters)
//! - [`connector`]: the [`Connector`] seam and its `tokio-tungstenite` implementation
//! - [`session`]: [`RelaySession`], the read loop / queue / forward loop pipeline
//! - [`sender`]: the [`StreamSender`] seam records are published through
//! - [`state`]: [`RelayState`] lifecycle

#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod endpoint;
pub mod sender;
pub mod session;
pub mod state;

pub use config::RelayConfig;
pub use connector::{Connector, TungsteniteConnector, UpstreamConnection};
pub use sender::StreamSender;
pub use session::RelaySession;
pub use state::RelayState;
