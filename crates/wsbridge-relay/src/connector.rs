//! Upstream connection seam.
//!
//! [`Connector`] dials; [`UpstreamConnection`] reads and closes. The relay only
//! talks to these traits, so tests can script connections without a socket.
//! [`TungsteniteConnector`] is the production implementation.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;
use wsbridge_core::errors::RelayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on sending our close frame to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens upstream connections. Never retries.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the opening handshake against `url` with `headers` attached.
    ///
    /// Any failure, including an invalid header, is [`RelayError::Connect`].
    async fn connect(
        &self,
        url: &Url,
        headers: &BTreeMap<String, String>,
    ) -> Result<Box<dyn UpstreamConnection>, RelayError>;
}

/// One established upstream connection, exclusively owned by a read loop.
#[async_trait]
pub trait UpstreamConnection: Send {
    /// Wait for the next payload.
    ///
    /// Errors are classified: [`RelayError::Disconnected`] when the peer went
    /// away, [`RelayError::TransientRead`] otherwise. Must be cancel-safe.
    async fn recv(&mut self) -> Result<String, RelayError>;

    /// Close the socket. Called exactly once per connection.
    async fn close(&mut self);
}

// ─────────────────────────────────────────────────────────────────────────────
// tokio-tungstenite implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Dials upstream feeds with `tokio-tungstenite`.
#[derive(Clone, Copy, Debug)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// Create a connector. Installs the process TLS provider for `wss://` on first use.
    pub fn new() -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &Url,
        headers: &BTreeMap<String, String>,
    ) -> Result<Box<dyn UpstreamConnection>, RelayError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::connect(e.to_string()))?;

        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RelayError::connect(format!("invalid header name '{name}'")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| RelayError::connect(format!("invalid value for header '{name}'")))?;
            let _ = request.headers_mut().insert(header_name, header_value);
        }

        let (ws, response) = connect_async(request)
            .await
            .map_err(|e| RelayError::connect(e.to_string()))?;
        debug!(status = %response.status(), "upstream handshake complete");

        Ok(Box::new(TungsteniteConnection { ws }))
    }
}

struct TungsteniteConnection {
    ws: WsStream,
}

#[async_trait]
impl UpstreamConnection for TungsteniteConnection {
    async fn recv(&mut self) -> Result<String, RelayError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(frame))) => return Err(classify_close(frame.as_ref())),
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(classify_error(&e)),
                None => return Err(RelayError::disconnected("stream ended without a close frame")),
            }
        }
    }

    async fn close(&mut self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.ws.close(None)).await {
            Ok(Ok(())) => debug!("upstream connection closed"),
            Ok(Err(e)) => debug!(error = %e, "upstream close after peer close"),
            Err(_) => debug!("upstream close timed out"),
        }
    }
}

/// A close frame with code 1001 is the only "going away" close; any other
/// code is surfaced as a read error.
pub(crate) fn classify_close(frame: Option<&CloseFrame>) -> RelayError {
    match frame {
        Some(frame) if frame.code == CloseCode::Away => {
            RelayError::disconnected(format!("going away (1001) {}", frame.reason.as_str()))
        }
        Some(frame) => RelayError::transient_read(format!(
            "connection closed ({}) {}",
            u16::from(frame.code),
            frame.reason.as_str()
        )),
        None => RelayError::transient_read("connection closed without status"),
    }
}

/// Errors meaning the socket is gone are disconnects; the rest are transient.
pub(crate) fn classify_error(err: &WsError) -> RelayError {
    match err {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            RelayError::disconnected(err.to_string())
        }
        WsError::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) =>
        {
            RelayError::disconnected(err.to_string())
        }
        _ => RelayError::transient_read(err.to_string()),
    }
}
