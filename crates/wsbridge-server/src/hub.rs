//! Record fan-out to subscribers, grouped by channel.
//!
//! Each record is serialized once and queued to every subscriber of its
//! channel with `try_send`; a slow subscriber loses records instead of
//! stalling the relay. [`ChannelSender`] plugs a channel into a relay session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};
use wsbridge_core::errors::RelayError;
use wsbridge_core::ids::ConnectionId;
use wsbridge_core::records::StreamRecord;
use wsbridge_relay::StreamSender;

use crate::subscriber::SubscriberConnection;

type Subscribers = HashMap<ConnectionId, Arc<SubscriberConnection>>;

/// Subscriber registry and broadcaster.
#[derive(Default)]
pub struct ChannelHub {
    channels: RwLock<HashMap<String, Subscribers>>,
}

impl ChannelHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its channel. Returns the channel's subscriber count.
    pub fn add(&self, connection: Arc<SubscriberConnection>) -> usize {
        let mut channels = self.channels.write();
        let subscribers = channels.entry(connection.channel.clone()).or_default();
        let _ = subscribers.insert(connection.id.clone(), connection);
        subscribers.len()
    }

    /// Unregister a connection. Returns the channel's remaining subscriber count.
    pub fn remove(&self, channel: &str, id: &ConnectionId) -> usize {
        let mut channels = self.channels.write();
        let Some(subscribers) = channels.get_mut(channel) else {
            return 0;
        };
        let _ = subscribers.remove(id);
        let remaining = subscribers.len();
        if remaining == 0 {
            let _ = channels.remove(channel);
        }
        remaining
    }

    /// Queue a record to every subscriber of `channel`.
    ///
    /// Returns how many subscribers accepted it.
    pub fn broadcast(&self, channel: &str, record: &StreamRecord) -> usize {
        let json = match record.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(channel, error = %e, "failed to serialize record");
                return 0;
            }
        };
        let channels = self.channels.read();
        let Some(subscribers) = channels.get(channel) else {
            return 0;
        };
        let mut delivered = 0;
        for conn in subscribers.values() {
            if conn.send(Arc::clone(&json)) {
                delivered += 1;
            } else {
                warn!(conn_id = %conn.id, channel, dropped = conn.drop_count(), "subscriber queue full, record dropped");
            }
        }
        debug!(channel, recipients = subscribers.len(), delivered, "broadcast record");
        delivered
    }

    /// Subscribers of one channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, HashMap::len)
    }

    /// Subscribers across all channels.
    pub fn connection_count(&self) -> usize {
        self.channels.read().values().map(HashMap::len).sum()
    }

    /// A [`StreamSender`] publishing into `channel`.
    pub fn sender(self: &Arc<Self>, channel: impl Into<String>) -> ChannelSender {
        ChannelSender {
            hub: Arc::clone(self),
            channel: channel.into(),
        }
    }
}

/// Publishes relay records to one channel's subscribers.
#[derive(Clone)]
pub struct ChannelSender {
    hub: Arc<ChannelHub>,
    channel: String,
}

#[async_trait]
impl StreamSender for ChannelSender {
    async fn send(&self, record: StreamRecord) -> Result<(), RelayError> {
        if self.hub.broadcast(&self.channel, &record) == 0 {
            return Err(RelayError::publish(format!(
                "no subscriber of '{}' accepted the record",
                self.channel
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;

    use super::*;

    fn subscriber(channel: &str, capacity: usize) -> (Arc<SubscriberConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(SubscriberConnection::new(channel, tx)), rx)
    }

    #[test]
    fn add_and_remove_track_counts() {
        let hub = ChannelHub::new();
        let (a, _ra) = subscriber("ds/u/a", 4);
        let (b, _rb) = subscriber("ds/u/a", 4);
        let (c, _rc) = subscriber("ds/u/c", 4);
        assert_eq!(hub.add(Arc::clone(&a)), 1);
        assert_eq!(hub.add(Arc::clone(&b)), 2);
        assert_eq!(hub.add(Arc::clone(&c)), 1);
        assert_eq!(hub.connection_count(), 3);

        assert_eq!(hub.remove("ds/u/a", &a.id), 1);
        assert_eq!(hub.remove("ds/u/a", &b.id), 0);
        assert_eq!(hub.subscriber_count("ds/u/a"), 0);
        assert_eq!(hub.remove("ds/u/missing", &c.id), 0);
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn broadcast_reaches_only_its_channel() {
        let hub = ChannelHub::new();
        let (a, mut ra) = subscriber("ds/u/a", 4);
        let (b, mut rb) = subscriber("ds/u/b", 4);
        let _ = hub.add(a);
        let _ = hub.add(b);

        assert_eq!(hub.broadcast("ds/u/a", &StreamRecord::error("x")), 1);
        assert_eq!(ra.try_recv().unwrap().as_str(), r#"{"error":"x"}"#);
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn full_subscriber_is_skipped() {
        let hub = ChannelHub::new();
        let (slow, _rs) = subscriber("ds/u/a", 1);
        let (fast, mut rf) = subscriber("ds/u/a", 8);
        let _ = hub.add(Arc::clone(&slow));
        let _ = hub.add(fast);

        assert_eq!(hub.broadcast("ds/u/a", &StreamRecord::data("1")), 2);
        assert_eq!(hub.broadcast("ds/u/a", &StreamRecord::data("2")), 1);
        assert_eq!(slow.drop_count(), 1);
        assert!(rf.try_recv().is_ok());
        assert!(rf.try_recv().is_ok());
    }

    #[tokio::test]
    async fn sender_fails_without_subscribers() {
        let hub = Arc::new(ChannelHub::new());
        let sender = hub.sender("ds/u/a");
        let result = sender.send(StreamRecord::data("x")).await;
        assert_matches!(result, Err(RelayError::Publish { .. }));
    }

    #[tokio::test]
    async fn sender_publishes_to_subscribers() {
        let hub = Arc::new(ChannelHub::new());
        let (a, mut ra) = subscriber("ds/u/a", 4);
        let _ = hub.add(a);
        hub.sender("ds/u/a").send(StreamRecord::data("x")).await.unwrap();
        let record: StreamRecord = serde_json::from_str(&ra.try_recv().unwrap()).unwrap();
        assert_eq!(record.payload(), Some("x"));
    }
}
