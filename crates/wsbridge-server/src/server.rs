//! `BridgeServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::datasource::{
    Capabilities, DataSourceInstance, HealthCheckResult, QueryRequest, QueryResponse,
    SubscribeStatus,
};
use crate::health::{self, HealthResponse};
use crate::hub::ChannelHub;
use crate::shutdown::ShutdownCoordinator;
use crate::streams::StreamManager;
use crate::subscriber::run_subscriber_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The datasource behind every route.
    pub instance: Arc<DataSourceInstance>,
    /// Subscriber registry and fan-out.
    pub hub: Arc<ChannelHub>,
    /// Relay per subscribed channel.
    pub streams: Arc<StreamManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// The bridge server.
pub struct BridgeServer {
    state: AppState,
}

impl BridgeServer {
    /// Create a new server for one datasource instance.
    pub fn new(config: ServerConfig, instance: DataSourceInstance) -> Self {
        let instance = Arc::new(instance);
        let hub = Arc::new(ChannelHub::new());
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let streams = Arc::new(StreamManager::new(
            Arc::clone(&instance),
            Arc::clone(&hub),
            Arc::clone(&shutdown),
        ));
        Self {
            state: AppState {
                instance,
                hub,
                streams,
                shutdown,
                config: Arc::new(config),
                start_time: Instant::now(),
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/capabilities", get(capabilities_handler))
            .route("/api/health", get(check_health_handler))
            .route("/api/query", post(query_handler))
            .route("/ws/{*channel}", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        info!(%addr, uid = self.state.instance.uid(), "bridge server listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Stop accepting subscribers, end their sessions and stop every relay.
    pub async fn shutdown(&self) {
        let handles = self.state.streams.drain();
        self.state
            .shutdown
            .graceful_shutdown(handles, Some(self.state.config.shutdown_timeout))
            .await;
        info!("bridge server stopped");
    }

    /// Get the channel hub.
    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.state.hub
    }

    /// Get the stream manager.
    pub fn streams(&self) -> &Arc<StreamManager> {
        &self.state.streams
    }

    /// Get the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the datasource instance.
    pub fn instance(&self) -> &Arc<DataSourceInstance> {
        &self.state.instance
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.streams.active_count(),
    ))
}

/// GET /api/capabilities
async fn capabilities_handler(State(state): State<AppState>) -> Json<Capabilities> {
    Json(state.instance.capabilities())
}

/// GET /api/health
async fn check_health_handler(State(state): State<AppState>) -> Json<HealthCheckResult> {
    Json(state.instance.check_health())
}

/// POST /api/query
async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Json<QueryResponse> {
    Json(state.instance.query(&request.queries))
}

/// GET /ws/{*channel}: subscribe to a channel.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(path) = state.instance.stream_path(&channel).map(str::to_owned) else {
        return (StatusCode::NOT_FOUND, "unknown channel").into_response();
    };
    if state.instance.subscribe_stream(&path) != SubscribeStatus::Ok {
        return (StatusCode::NOT_FOUND, "unknown channel").into_response();
    }
    if state.hub.connection_count() >= state.config.max_connections {
        warn!(channel = %channel, max = state.config.max_connections, "subscriber limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many subscribers").into_response();
    }
    ws.on_upgrade(move |socket| run_subscriber_session(socket, channel, path, state))
}
