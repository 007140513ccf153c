//! Datasource instance: the host-facing surface of one configured upstream.
//!
//! A query with streaming enabled answers with a channel name,
//! `ds/<uid>/<path>`. Subscribing to that channel runs a relay session
//! against `<base url>/<path>`. Channels are read-only.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wsbridge_core::constants::{CHANNEL_SCOPE, NAME, VERSION};
use wsbridge_core::errors::RelayError;
use wsbridge_core::records::StreamRecord;
use wsbridge_relay::endpoint::build_url;
use wsbridge_relay::{Connector, RelayConfig, RelaySession, StreamSender};
use wsbridge_settings::ConnectionSettings;

/// Stream path used when a query names none.
pub const DEFAULT_PATH: &str = ".";

/// What this datasource supports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Implementation name.
    pub name: &'static str,
    /// Implementation version.
    pub version: &'static str,
    /// Datasource UID.
    pub uid: String,
    /// Queries are answered.
    pub query: bool,
    /// Channels can be subscribed to.
    pub streaming: bool,
    /// Clients may publish into channels.
    pub publish: bool,
}

/// One query from a query request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataQuery {
    /// Caller-chosen identifier echoed in the response.
    pub ref_id: String,
    /// Whether to answer with a channel to subscribe to.
    pub with_streaming: bool,
    /// Stream path under the base URL.
    pub path: Option<String>,
}

/// Body of `POST /api/query`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueryRequest {
    /// Raw queries; each is parsed on its own so one bad query does not fail the rest.
    #[serde(default)]
    pub queries: Vec<Value>,
}

/// A response frame. Streaming queries carry the channel to subscribe to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Frame name.
    pub name: String,
    /// Channel to subscribe to for live records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Outcome of one query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    /// Frames produced by the query.
    pub frames: Vec<Frame>,
    /// Why the query failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body returned by `POST /api/query`, keyed by `refId`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueryResponse {
    /// Per-query results.
    pub results: BTreeMap<String, QueryResult>,
}

/// Health of the instance configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The upstream URL can be built.
    Ok,
    /// The configuration is unusable.
    Error,
}

/// Body returned by `GET /api/health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    /// Overall status.
    pub status: HealthStatus,
    /// Human-readable detail.
    pub message: String,
}

/// Answer to a subscription request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeStatus {
    /// Subscription allowed.
    Ok,
    /// No such channel.
    NotFound,
}

/// Answer to a publish request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishStatus {
    /// Publishing is never allowed.
    PermissionDenied,
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("permission denied: channel is read-only"),
        }
    }
}

/// One configured datasource.
pub struct DataSourceInstance {
    uid: String,
    settings: Arc<ConnectionSettings>,
    connector: Arc<dyn Connector>,
    relay: RelayConfig,
}

impl DataSourceInstance {
    /// Resolve connection settings and build the instance.
    ///
    /// Fails with [`RelayError::MalformedConfig`] when `raw_json` is not a flat
    /// string map.
    pub fn new(
        uid: impl Into<String>,
        raw_json: &str,
        secrets: &HashMap<String, String>,
        connector: Arc<dyn Connector>,
        relay: RelayConfig,
    ) -> Result<Self, RelayError> {
        let uid = uid.into();
        let settings = ConnectionSettings::resolve(raw_json, secrets)?;
        info!(uid = %uid, settings = ?settings, "datasource instance created");
        Ok(Self {
            uid,
            settings: Arc::new(settings),
            connector,
            relay,
        })
    }

    /// Datasource UID.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Resolved connection settings.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Feature flags for this datasource.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: NAME,
            version: VERSION,
            uid: self.uid.clone(),
            query: true,
            streaming: true,
            publish: false,
        }
    }

    /// Channel name for a stream path.
    pub fn channel_for(&self, path: &str) -> String {
        format!("{CHANNEL_SCOPE}/{}/{path}", self.uid)
    }

    /// Stream path of one of this instance's channels, or `None` if the
    /// channel belongs elsewhere.
    pub fn stream_path<'a>(&self, channel: &'a str) -> Option<&'a str> {
        let rest = channel.strip_prefix(CHANNEL_SCOPE)?.strip_prefix('/')?;
        let path = rest.strip_prefix(self.uid.as_str())?.strip_prefix('/')?;
        (!path.is_empty()).then_some(path)
    }

    /// Answer a batch of raw queries.
    ///
    /// A query that does not parse gets an error result under its `refId`
    /// (or its index when it has none); the others are unaffected.
    pub fn query(&self, queries: &[Value]) -> QueryResponse {
        let mut response = QueryResponse::default();
        for (index, raw) in queries.iter().enumerate() {
            let fallback_id = raw
                .get("refId")
                .and_then(Value::as_str)
                .map_or_else(|| index.to_string(), str::to_owned);
            let result = match DataQuery::deserialize(raw) {
                Ok(query) => self.run_query(&query),
                Err(e) => {
                    warn!(ref_id = %fallback_id, error = %e, "invalid query");
                    QueryResult {
                        frames: Vec::new(),
                        error: Some(format!("invalid query: {e}")),
                    }
                }
            };
            let _ = response.results.insert(fallback_id, result);
        }
        response
    }

    fn run_query(&self, query: &DataQuery) -> QueryResult {
        let channel = query.with_streaming.then(|| {
            let path = query
                .path
                .as_deref()
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_PATH);
            self.channel_for(path)
        });
        QueryResult {
            frames: vec![Frame {
                name: "response".into(),
                channel,
            }],
            error: None,
        }
    }

    /// Check that the configured upstream URL can be built.
    pub fn check_health(&self) -> HealthCheckResult {
        match build_url(&self.settings.base_url, "", &self.settings.custom_query_parameters) {
            Ok(_) => HealthCheckResult {
                status: HealthStatus::Ok,
                message: "Data source is working".into(),
            },
            Err(e) => HealthCheckResult {
                status: HealthStatus::Error,
                message: e.to_string(),
            },
        }
    }

    /// Any path of this instance may be subscribed to.
    pub fn subscribe_stream(&self, path: &str) -> SubscribeStatus {
        if path.is_empty() {
            SubscribeStatus::NotFound
        } else {
            SubscribeStatus::Ok
        }
    }

    /// Clients never publish into channels.
    pub fn publish_stream(&self, _path: &str) -> PublishStatus {
        PublishStatus::PermissionDenied
    }

    /// Relay `path` into `sender` until `cancel` fires or the relay fails.
    ///
    /// A creation failure is published as an error record before it is
    /// returned, so subscribers see why nothing arrives.
    pub async fn run_stream(
        &self,
        path: &str,
        sender: Arc<dyn StreamSender>,
        cancel: CancellationToken,
    ) -> Result<(), RelayError> {
        let started = RelaySession::start(
            Arc::clone(&self.settings),
            path,
            Arc::clone(&self.connector),
            Arc::clone(&sender),
            self.relay.clone(),
        )
        .await;
        let mut session = match started {
            Ok(session) => session,
            Err(e) => {
                let _ = sender.send(StreamRecord::error(e.to_string())).await;
                return Err(e);
            }
        };
        match session.wait(&cancel).await {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}
