//! Downstream subscriber connections, from upgrade through disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use wsbridge_core::ids::ConnectionId;
use wsbridge_core::records::StreamRecord;

use crate::server::AppState;

/// A connected subscriber of one channel.
pub struct SubscriberConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Channel this connection subscribed to.
    pub channel: String,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the last Pong (or any frame) was received.
    last_seen: Mutex<Instant>,
    /// Records dropped because the outbound queue was full.
    dropped_records: AtomicU64,
}

impl SubscriberConnection {
    /// Create a new connection.
    pub fn new(channel: impl Into<String>, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            channel: channel.into(),
            tx,
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_records: AtomicU64::new(0),
        }
    }

    /// Queue a serialized record without waiting.
    ///
    /// Returns `false` and counts a drop if the queue is full or closed.
    pub fn send(&self, record: Arc<String>) -> bool {
        if self.tx.try_send(record).is_ok() {
            true
        } else {
            let _ = self.dropped_records.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a record and queue it for this connection only.
    pub fn send_record(&self, record: &StreamRecord) -> bool {
        match record.to_json() {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total records dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    /// Record activity from the peer.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the peer was last heard from.
    pub fn last_seen_elapsed(&self) -> std::time::Duration {
        self.last_seen.lock().elapsed()
    }
}

/// Run a subscription for one upgraded socket.
///
/// 1. Registers the connection with the hub, then acquires the channel's relay
/// 2. Forwards queued records as text frames, with periodic Ping frames
/// 3. Answers any client data frame with a permission-denied error record
/// 4. On disconnect or shutdown, unregisters and releases the relay
#[instrument(skip_all, fields(channel = %channel))]
pub async fn run_subscriber_session(ws: WebSocket, channel: String, path: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.subscriber_queue_size);
    let connection = Arc::new(SubscriberConnection::new(channel.clone(), send_tx));
    let conn_id = connection.id.clone();

    info!(conn_id = %conn_id, "subscriber connected");
    let _ = state.hub.add(Arc::clone(&connection));
    let _ = state.streams.acquire(&channel, &path);

    let outbound_conn = Arc::clone(&connection);
    let heartbeat_interval = state.config.heartbeat_interval;
    let heartbeat_timeout = state.config.heartbeat_timeout;
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                record = send_rx.recv() => {
                    let Some(text) = record else { break };
                    if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if outbound_conn.last_seen_elapsed() > heartbeat_timeout {
                        warn!(timeout = ?heartbeat_timeout, "subscriber unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let shutdown = state.shutdown.token();
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => {
                debug!("server shutting down, ending subscription");
                break;
            }
            frame = ws_rx.next() => frame,
        };
        let Some(Ok(msg)) = frame else { break };
        connection.mark_alive();
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                let status = state.instance.publish_stream(&path);
                debug!(%status, "rejected client publish");
                let _ = connection.send_record(&StreamRecord::error(status.to_string()));
            }
            Message::Close(_) => {
                info!("subscriber sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let _ = state.hub.remove(&channel, &conn_id);
    state.streams.release(&channel).await;
    outbound.abort();
    info!(
        conn_id = %conn_id,
        dropped = connection.drop_count(),
        connected_secs = connection.connected_at.elapsed().as_secs(),
        "subscriber disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_queues_until_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let conn = SubscriberConnection::new("ds/uid/feed", tx);
        assert!(conn.send(Arc::new("a".into())));
        assert!(!conn.send(Arc::new("b".into())));
        assert_eq!(conn.drop_count(), 1);
        assert_eq!(rx.try_recv().unwrap().as_str(), "a");
    }

    #[test]
    fn send_to_closed_queue_counts_drop() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let conn = SubscriberConnection::new("ds/uid/feed", tx);
        assert!(!conn.send(Arc::new("a".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_record_serializes() {
        let (tx, mut rx) = mpsc::channel(4);
        let conn = SubscriberConnection::new("ds/uid/feed", tx);
        assert!(conn.send_record(&StreamRecord::error("nope")));
        assert_eq!(rx.try_recv().unwrap().as_str(), r#"{"error":"nope"}"#);
    }

    #[test]
    fn ids_are_unique() {
        let (tx, _rx) = mpsc::channel(1);
        let a = SubscriberConnection::new("c", tx.clone());
        let b = SubscriberConnection::new("c", tx);
        assert_ne!(a.id, b.id);
        assert_eq!(a.channel, "c");
    }

    #[test]
    fn mark_alive_resets_elapsed() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = SubscriberConnection::new("c", tx);
        conn.mark_alive();
        assert!(conn.last_seen_elapsed() < std::time::Duration::from_secs(1));
    }
}
