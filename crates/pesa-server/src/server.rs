//! `PesaServer`: router assembly and listener lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use pesa_gateway::DarajaClient;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handlers::{b2c, stk};
use crate::health::{self, HealthResponse};
use crate::hub::{Hub, HubHandle};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::websocket::{ConnectionState, PumpConfig, SessionConfig, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub.
    pub hub: HubHandle,
    /// Gateway client for payment initiation.
    pub gateway: Arc<DarajaClient>,
    /// Per-subscriber session parameters.
    pub session: SessionConfig,
    /// Largest inbound WebSocket message accepted.
    pub max_message_size: usize,
    /// Root shutdown token; sessions run on child tokens.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Build the router with all routes.
pub fn build_router(state: AppState, cors_allow_any_origin: bool) -> Router {
    let router = Router::new()
        .route("/api/v1/stk/initiate", post(stk::initiate))
        .route("/api/v1/stk/callback", post(stk::callback))
        .route("/api/v1/b2c/payment", post(b2c::payment))
        .route("/api/v1/b2c/result", post(b2c::result))
        .route("/api/v1/b2c/timeout", post(b2c::timeout))
        .route("/ws/payments", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_allow_any_origin {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// The relay server.
pub struct PesaServer {
    config: ServerConfig,
    gateway: Arc<DarajaClient>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
}

impl PesaServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, gateway: Arc<DarajaClient>) -> Self {
        Self {
            config,
            gateway,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start the hub, bind the listener and begin serving.
    pub async fn listen(self) -> std::io::Result<ServerHandle> {
        let token = self.shutdown.token();
        let (hub, hub_task) = Hub::spawn(token.clone());

        let state = AppState {
            hub: hub.clone(),
            gateway: self.gateway,
            session: SessionConfig {
                pump: PumpConfig {
                    heartbeat_interval: self.config.heartbeat_interval,
                    heartbeat_timeout: self.config.heartbeat_timeout,
                },
                send_queue_capacity: self.config.send_queue_capacity,
            },
            max_message_size: self.config.max_message_size,
            shutdown: token.clone(),
            start_time: Instant::now(),
            metrics: self.metrics,
        };
        let router = build_router(state, self.config.cors_allow_any_origin);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "payment relay listening");

        let server_task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });

        self.shutdown.track("listener", server_task);
        self.shutdown.track("hub", hub_task);

        Ok(ServerHandle {
            addr,
            hub,
            shutdown: self.shutdown,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    hub: HubHandle,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle to the broadcast hub.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Signal shutdown and wait for the listener and hub to stop.
    pub async fn shutdown(self, timeout: Option<Duration>) -> ShutdownReport {
        self.shutdown.graceful_shutdown(timeout).await
    }
}

/// GET /ws/payments
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            let conn = Arc::new(ConnectionState::new());
            run_ws_session(socket, conn, state.hub, state.session, state.shutdown)
        })
}

/// GET /health
///
/// 503 once the hub loop has stopped, since no event can be delivered.
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = health::health_check(
        state.start_time,
        state.hub.client_count(),
        state.hub.is_running(),
    );
    let status = if health.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
