//! # wsbridge-core
//!
//! Foundation types, errors, records, and utilities for the wsbridge relay.
//!
//! This crate provides the shared vocabulary every other wsbridge crate depends on:
//!
//! - **Errors**: [`RelayError`](errors::RelayError) taxonomy via `thiserror`
//! - **Records**: [`StreamRecord`](records::StreamRecord), the unit published to subscribers
//! - **Branded IDs**: `SessionId`, `ConnectionId` as newtypes for type safety
//! - **Retry**: reconnect backoff configuration and delay math
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod records;
pub mod retry;
