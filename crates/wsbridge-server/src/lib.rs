//! # wsbridge-server
//!
//! HTTP + WebSocket surface for one datasource instance.
//!
//! - [`datasource`]: [`DataSourceInstance`], queries, health, stream entry point
//! - [`hub`]: per-channel subscriber registry and fan-out ([`ChannelSender`])
//! - [`streams`]: one relay per subscribed channel, started and stopped by subscriber count
//! - [`subscriber`]: downstream connection state and session loop
//! - [`server`]: [`BridgeServer`] and its Axum routes
//! - [`shutdown`]: graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod datasource;
pub mod health;
pub mod hub;
pub mod server;
pub mod shutdown;
pub mod streams;
pub mod subscriber;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use datasource::DataSourceInstance;
pub use hub::{ChannelHub, ChannelSender};
pub use server::BridgeServer;
pub use shutdown::ShutdownCoordinator;
pub use streams::StreamManager;
