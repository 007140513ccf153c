//! Downstream publish seam.

use async_trait::async_trait;
use wsbridge_core::errors::RelayError;
use wsbridge_core::records::StreamRecord;

/// Publishes records to every subscriber of one channel.
///
/// One call is one logical publish. Failures are reported, never retried by
/// the relay.
#[async_trait]
pub trait StreamSender: Send + Sync {
    /// Publish one record.
    async fn send(&self, record: StreamRecord) -> Result<(), RelayError>;
}
