//! End-to-end: real upstream, real bridge server, real subscriber client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_async, connect_async};
use wsbridge_core::records::StreamRecord;
use wsbridge_relay::{RelayConfig, TungsteniteConnector};
use wsbridge_server::{BridgeServer, DataSourceInstance, ServerConfig};

const WAIT: Duration = Duration::from_secs(10);

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Upstream that accepts one connection, sends `messages`, then holds the
/// connection until the peer closes it. `closed` fires when it does.
async fn spawn_upstream(messages: &'static [&'static str]) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    let _upstream = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for m in messages {
            ws.send(Message::Text((*m).into())).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
        let _ = closed_tx.send("closed".to_string());
    });

    (format!("ws://{addr}/feeds"), closed_rx)
}

async fn boot_bridge(base_url: &str) -> (String, BridgeServer) {
    let raw = format!(r#"{{"url": "{base_url}"}}"#);
    let instance = DataSourceInstance::new(
        "test-uid",
        &raw,
        &HashMap::new(),
        Arc::new(TungsteniteConnector::new()),
        RelayConfig::default(),
    )
    .unwrap();
    let server = BridgeServer::new(ServerConfig::default(), instance);
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}"), server)
}

async fn next_record(client: &mut Client) -> StreamRecord {
    loop {
        let msg = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn subscriber_receives_upstream_messages() {
    let (upstream, upstream_closed) = spawn_upstream(&["tick-1", "tick-2"]).await;
    let (bridge, server) = boot_bridge(&upstream).await;

    let (mut client, _) = connect_async(format!("{bridge}/ws/ds/test-uid/prices"))
        .await
        .unwrap();

    assert_eq!(next_record(&mut client).await.payload(), Some("tick-1"));
    assert_eq!(next_record(&mut client).await.payload(), Some("tick-2"));
    assert_eq!(server.streams().active_count(), 1);

    // Channels are read-only
    client.send(Message::Text("hello".into())).await.unwrap();
    let denied = next_record(&mut client).await;
    assert_matches!(&denied, StreamRecord::Error { error } if error.starts_with("permission denied"));

    // Last subscriber leaving stops the relay and closes the upstream
    client.close(None).await.unwrap();
    assert_eq!(timeout(WAIT, upstream_closed).await.unwrap().unwrap(), "closed");
    for _ in 0..100 {
        if server.streams().active_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.streams().active_count(), 0);
    assert_eq!(server.hub().connection_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_upstream_is_reported_to_subscriber() {
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);
    let (bridge, server) = boot_bridge(&format!("ws://{dead_addr}")).await;

    let (mut client, _) = connect_async(format!("{bridge}/ws/ds/test-uid/prices"))
        .await
        .unwrap();
    let record = next_record(&mut client).await;
    assert_matches!(&record, StreamRecord::Error { error } if error.starts_with("connection error"));

    server.shutdown().await;
}

#[tokio::test]
async fn foreign_channel_is_rejected() {
    let (bridge, server) = boot_bridge("ws://127.0.0.1:9").await;

    let err = connect_async(format!("{bridge}/ws/ds/other-uid/prices"))
        .await
        .err()
        .unwrap();
    assert_matches!(err, WsError::Http(resp) if resp.status() == 404);

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_ends_subscriptions() {
    let (upstream, upstream_closed) = spawn_upstream(&["tick"]).await;
    let (bridge, server) = boot_bridge(&upstream).await;

    let (mut client, _) = connect_async(format!("{bridge}/ws/ds/test-uid/prices"))
        .await
        .unwrap();
    assert_eq!(next_record(&mut client).await.payload(), Some("tick"));

    timeout(WAIT, server.shutdown()).await.unwrap();
    assert!(server.shutdown_coordinator().is_shutting_down());
    assert_eq!(timeout(WAIT, upstream_closed).await.unwrap().unwrap(), "closed");
}
