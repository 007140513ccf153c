//! Relay lifecycle per channel.
//!
//! The first subscriber of a channel starts its relay; the last one leaving
//! stops it and waits for it to finish. A relay that ends with an error while
//! subscribers remain is restarted after a delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wsbridge_relay::StreamSender;

use crate::datasource::DataSourceInstance;
use crate::hub::ChannelHub;
use crate::shutdown::ShutdownCoordinator;

/// Pause before restarting a relay that failed.
const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

struct RunningStream {
    subscribers: usize,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Starts and stops one relay per subscribed channel.
pub struct StreamManager {
    instance: Arc<DataSourceInstance>,
    hub: Arc<ChannelHub>,
    shutdown: Arc<ShutdownCoordinator>,
    restart_delay: Duration,
    running: Mutex<HashMap<String, RunningStream>>,
}

impl StreamManager {
    /// Create a manager with no running relays.
    pub fn new(
        instance: Arc<DataSourceInstance>,
        hub: Arc<ChannelHub>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            instance,
            hub,
            shutdown,
            restart_delay: DEFAULT_RESTART_DELAY,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Override the pause before a failed relay is restarted.
    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Count a subscriber of `channel`, starting its relay on the first one.
    ///
    /// Returns whether a relay was started. Nothing starts during shutdown.
    pub fn acquire(&self, channel: &str, path: &str) -> bool {
        let mut running = self.running.lock();
        if let Some(stream) = running.get_mut(channel) {
            stream.subscribers += 1;
            return false;
        }
        if self.shutdown.is_shutting_down() {
            return false;
        }

        let cancel = self.shutdown.relay_token();
        let sender: Arc<dyn StreamSender> = Arc::new(self.hub.sender(channel));
        let task = tokio::spawn(supervise(
            Arc::clone(&self.instance),
            sender,
            channel.to_string(),
            path.to_string(),
            cancel.clone(),
            self.restart_delay,
        ));
        info!(channel, path, "relay started");
        let _ = running.insert(
            channel.to_string(),
            RunningStream {
                subscribers: 1,
                cancel,
                task,
            },
        );
        true
    }

    /// Drop a subscriber of `channel`. The last one stops the relay and
    /// waits for it to finish.
    pub async fn release(&self, channel: &str) {
        let stopped = {
            let mut running = self.running.lock();
            let Some(stream) = running.get_mut(channel) else {
                return;
            };
            stream.subscribers = stream.subscribers.saturating_sub(1);
            if stream.subscribers > 0 {
                return;
            }
            running.remove(channel)
        };
        if let Some(stream) = stopped {
            stream.cancel.cancel();
            if let Err(e) = stream.task.await {
                error!(channel, error = %e, "relay task panicked");
            }
            info!(channel, "relay stopped, no subscribers left");
        }
    }

    /// Channels with a running relay.
    pub fn active_count(&self) -> usize {
        self.running.lock().len()
    }

    /// Subscribers counted for `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.running.lock().get(channel).map_or(0, |s| s.subscribers)
    }

    /// Take every relay task for shutdown. Their tokens are children of the
    /// shutdown token, so cancelling it stops them all.
    pub fn drain(&self) -> Vec<JoinHandle<()>> {
        self.running.lock().drain().map(|(_, stream)| stream.task).collect()
    }
}

/// Run the channel's relay until cancelled, restarting it after failures.
async fn supervise(
    instance: Arc<DataSourceInstance>,
    sender: Arc<dyn StreamSender>,
    channel: String,
    path: String,
    cancel: CancellationToken,
    restart_delay: Duration,
) {
    loop {
        match instance.run_stream(&path, Arc::clone(&sender), cancel.clone()).await {
            Ok(()) => break,
            Err(e) => {
                warn!(
                    channel = %channel,
                    code = e.code(),
                    error = %e,
                    delay = ?restart_delay,
                    "relay ended, restarting"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(restart_delay) => {}
                }
            }
        }
    }
    debug!(channel = %channel, "relay supervisor stopped");
}
