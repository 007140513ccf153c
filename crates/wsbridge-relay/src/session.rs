//! Relay session: one upstream connection feeding one channel.
//!
//! A session runs two tasks joined by a bounded queue:
//!
//! - the **read loop** owns the connection, stamps each payload as a
//!   [`StreamRecord`] the moment it arrives and pushes it onto the queue. It
//!   reconnects when the peer goes away and backs off on other read errors
//! - the **forward loop** drains the queue in order and publishes each record
//!   through the [`StreamSender`]
//!
//! Error records travel through the same queue as data, so subscribers see
//! them in the order the read loop observed them. The owner stops the session
//! with [`RelaySession::close`] (idempotent), which cancels both loops, closes
//! the connection and joins the tasks before returning.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use wsbridge_core::errors::RelayError;
use wsbridge_core::ids::SessionId;
use wsbridge_core::records::StreamRecord;
use wsbridge_settings::ConnectionSettings;

use crate::config::RelayConfig;
use crate::connector::{Connector, UpstreamConnection};
use crate::endpoint::{build_url, redact_url};
use crate::sender::StreamSender;
use crate::state::RelayState;

/// Item handed from the read loop to the forward loop.
enum Inbound {
    /// Upstream payload, stamped with its receipt time.
    Data(StreamRecord),
    /// Recoverable failure; published as an error record.
    Fault(RelayError),
    /// Final failure; published, then reported to the owner.
    Terminal(RelayError),
}

type StateTx = Arc<watch::Sender<RelayState>>;

/// A running relay for one channel.
pub struct RelaySession {
    id: SessionId,
    channel: String,
    target: Url,
    done: CancellationToken,
    state: StateTx,
    failure: Option<oneshot::Receiver<RelayError>>,
    read_task: Option<JoinHandle<()>>,
    forward_task: Option<JoinHandle<()>>,
}

impl RelaySession {
    /// Build the target URL, dial it and start both loops.
    ///
    /// Fails with [`RelayError::InvalidHost`] or [`RelayError::Connect`];
    /// nothing is retried and no task is left behind on failure.
    pub async fn start(
        settings: Arc<ConnectionSettings>,
        channel: &str,
        connector: Arc<dyn Connector>,
        sender: Arc<dyn StreamSender>,
        config: RelayConfig,
    ) -> Result<Self, RelayError> {
        let id = SessionId::new();
        let (state_tx, _) = watch::channel(RelayState::Connecting);
        let target = build_url(&settings.base_url, channel, &settings.custom_query_parameters)?;

        info!(session_id = %id, channel, target = %redact_url(&target), "connecting upstream");
        let connection = connector
            .connect(&target, &settings.custom_headers)
            .await
            .inspect_err(|e| {
                warn!(session_id = %id, channel, code = e.code(), error = %e, "upstream connect failed");
            })?;

        let _ = state_tx.send_replace(RelayState::Streaming);
        let state = Arc::new(state_tx);
        let done = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (failure_tx, failure_rx) = oneshot::channel();

        let reader = ReadLoop {
            id: id.clone(),
            target: target.clone(),
            settings,
            connector,
            queue: queue_tx,
            done: done.clone(),
            state: Arc::clone(&state),
            config,
        };
        let forwarder = ForwardLoop {
            id: id.clone(),
            queue: queue_rx,
            sender,
            done: done.clone(),
            state: Arc::clone(&state),
            failure: Some(failure_tx),
        };

        let read_task = tokio::spawn(reader.run(connection));
        let forward_task = tokio::spawn(forwarder.run());
        info!(session_id = %id, channel, "relay streaming");

        Ok(Self {
            id,
            channel: channel.to_string(),
            target,
            done,
            state,
            failure: Some(failure_rx),
            read_task: Some(read_task),
            forward_task: Some(forward_task),
        })
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Channel path this session serves.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Resolved upstream URL. Contains secret query values; log
    /// [`redact_url`] instead.
    pub fn target_url(&self) -> &Url {
        &self.target
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Run until `cancel` fires or the session fails, then tear down.
    ///
    /// Returns the terminal error when reconnection failed, `None` when the
    /// owner cancelled or the session was already closed.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Option<RelayError> {
        let outcome = match self.failure.take() {
            Some(failure) => tokio::select! {
                () = cancel.cancelled() => None,
                reported = failure => reported.ok(),
            },
            None => None,
        };
        self.close().await;
        outcome
    }

    /// Cancel both loops, close the connection and join the tasks.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn close(&mut self) {
        self.done.cancel();
        for task in [self.read_task.take(), self.forward_task.take()].into_iter().flatten() {
            if let Err(e) = task.await {
                error!(session_id = %self.id, error = %e, "relay task panicked");
            }
        }
        if mark_closed(&self.state) {
            info!(session_id = %self.id, channel = %self.channel, "relay session closed");
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        // Tasks observe cancellation and close the connection on their own
        self.done.cancel();
    }
}

/// Move to `Closed` unless already there. Returns whether this call did it.
fn mark_closed(state: &StateTx) -> bool {
    state.send_if_modified(|current| {
        if current.is_closed() {
            false
        } else {
            *current = RelayState::Closed;
            true
        }
    })
}

fn set_state(state: &StateTx, next: RelayState) {
    let _ = state.send_if_modified(|current| {
        if current.is_closed() || *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Read loop
// ─────────────────────────────────────────────────────────────────────────────

struct ReadLoop {
    id: SessionId,
    target: Url,
    settings: Arc<ConnectionSettings>,
    connector: Arc<dyn Connector>,
    queue: mpsc::Sender<Inbound>,
    done: CancellationToken,
    state: StateTx,
    config: RelayConfig,
}

enum Reconnect {
    Connected(Box<dyn UpstreamConnection>),
    Cancelled,
    Failed(RelayError),
}

impl ReadLoop {
    async fn run(self, connection: Box<dyn UpstreamConnection>) {
        let mut connection = Some(connection);
        self.pump(&mut connection).await;
        if let Some(mut last) = connection.take() {
            last.close().await;
        }
        debug!(session_id = %self.id, "read loop stopped");
        // Dropping `self.queue` lets the forward loop drain and exit
    }

    async fn pump(&self, connection: &mut Option<Box<dyn UpstreamConnection>>) {
        loop {
            let Some(active) = connection.as_mut() else {
                return;
            };
            let received = tokio::select! {
                biased;
                () = self.done.cancelled() => return,
                received = active.recv() => received,
            };

            match received {
                Ok(payload) => {
                    if !self.enqueue(Inbound::Data(StreamRecord::data(payload))).await {
                        return;
                    }
                }
                Err(err @ RelayError::Disconnected { .. }) => {
                    warn!(session_id = %self.id, error = %err, "upstream went away, reconnecting");
                    if !self.enqueue(Inbound::Fault(err)).await {
                        return;
                    }
                    set_state(&self.state, RelayState::Reconnecting);
                    if let Some(mut old) = connection.take() {
                        old.close().await;
                    }
                    match self.reconnect().await {
                        Reconnect::Connected(fresh) => {
                            *connection = Some(fresh);
                            set_state(&self.state, RelayState::Streaming);
                            info!(session_id = %self.id, "upstream reconnected");
                        }
                        Reconnect::Cancelled => return,
                        Reconnect::Failed(err) => {
                            error!(
                                session_id = %self.id,
                                error = %err,
                                "upstream reconnect failed, ending session"
                            );
                            let _ = self.enqueue(Inbound::Terminal(err)).await;
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        session_id = %self.id,
                        error = %err,
                        backoff = ?self.config.read_error_backoff,
                        "upstream read failed, backing off"
                    );
                    if !self.enqueue(Inbound::Fault(err)).await {
                        return;
                    }
                    tokio::select! {
                        biased;
                        () = self.done.cancelled() => return,
                        () = tokio::time::sleep(self.config.read_error_backoff) => {}
                    }
                }
            }
        }
    }

    /// Dial the same target with the same headers, up to the configured
    /// number of attempts.
    async fn reconnect(&self) -> Reconnect {
        let policy = &self.config.reconnect;
        let mut last_reason = String::from("reconnect disabled");

        for attempt in 0..policy.max_retries {
            let delay = policy.delay_before(attempt, rand::random::<f64>());
            if !delay.is_zero() {
                debug!(
                    session_id = %self.id,
                    attempt = attempt + 1,
                    delay = ?delay,
                    "waiting before reconnect"
                );
                tokio::select! {
                    biased;
                    () = self.done.cancelled() => return Reconnect::Cancelled,
                    () = tokio::time::sleep(delay) => {}
                }
            }

            let dial = self.connector.connect(&self.target, &self.settings.custom_headers);
            let result = tokio::select! {
                biased;
                () = self.done.cancelled() => return Reconnect::Cancelled,
                result = dial => result,
            };
            match result {
                Ok(fresh) => return Reconnect::Connected(fresh),
                Err(err) => {
                    warn!(
                        session_id = %self.id,
                        attempt = attempt + 1,
                        error = %err,
                        "reconnect attempt failed"
                    );
                    last_reason = match err {
                        RelayError::Connect { reason } => reason,
                        other => other.to_string(),
                    };
                }
            }
        }

        Reconnect::Failed(RelayError::ReconnectFailed {
            attempts: policy.max_retries,
            reason: last_reason,
        })
    }

    /// Returns `false` when the session is cancelled or the forward loop is gone.
    async fn enqueue(&self, item: Inbound) -> bool {
        tokio::select! {
            biased;
            () = self.done.cancelled() => false,
            sent = self.queue.send(item) => sent.is_ok(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Forward loop
// ─────────────────────────────────────────────────────────────────────────────

struct ForwardLoop {
    id: SessionId,
    queue: mpsc::Receiver<Inbound>,
    sender: Arc<dyn StreamSender>,
    done: CancellationToken,
    state: StateTx,
    failure: Option<oneshot::Sender<RelayError>>,
}

impl ForwardLoop {
    async fn run(mut self) {
        loop {
            let item = tokio::select! {
                biased;
                () = self.done.cancelled() => break,
                item = self.queue.recv() => item,
            };
            let Some(item) = item else { break };

            let (record, terminal) = match item {
                Inbound::Data(record) => (record, None),
                Inbound::Fault(err) => (StreamRecord::error(err.to_string()), None),
                Inbound::Terminal(err) => (StreamRecord::error(err.to_string()), Some(err)),
            };

            let published = tokio::select! {
                biased;
                () = self.done.cancelled() => break,
                published = self.sender.send(record) => published,
            };
            if let Err(e) = published {
                warn!(session_id = %self.id, code = e.code(), error = %e, "failed to publish record");
            }

            if let Some(err) = terminal {
                let _ = mark_closed(&self.state);
                if let Some(failure) = self.failure.take() {
                    let _ = failure.send(err);
                }
                break;
            }
        }
        debug!(session_id = %self.id, "forward loop stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
