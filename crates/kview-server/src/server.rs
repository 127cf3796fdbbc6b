//! `KviewServer`: Axum HTTP + WebSocket host for relay sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::header::{CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use kview_cluster::ClusterQuery;
use kview_settings::{KviewSettings, RelaySettings};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::health::{self, HealthResponse};
use crate::session::Session;
use crate::shutdown::ShutdownCoordinator;
use crate::transport::split_websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cluster query service shared by every session.
    pub cluster: Arc<dyn ClusterQuery>,
    /// Per-session tuning.
    pub relay: Arc<RelaySettings>,
    /// Origins allowed to open `/ws`. Empty allows all.
    pub allowed_origins: Arc<[String]>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay server.
pub struct KviewServer {
    settings: KviewSettings,
    cluster: Arc<dyn ClusterQuery>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl KviewServer {
    /// Create a new server.
    pub fn new(
        settings: KviewSettings,
        cluster: Arc<dyn ClusterQuery>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            settings,
            cluster,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            cluster: self.cluster.clone(),
            relay: Arc::new(self.settings.relay.clone()),
            allowed_origins: self.settings.server.allowed_origins.clone().into(),
            shutdown: self.shutdown.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(cors_layer(&self.settings.server.allowed_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until the shutdown token is cancelled.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "kview relay listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                warn!(error = %e, "http server stopped with error");
            }
        });

        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the loaded settings.
    pub fn settings(&self) -> &KviewSettings {
        &self.settings
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring unparseable allowed origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

/// Whether a request's `Origin` may open a session.
///
/// Requests without an `Origin` header (non-browser clients) are allowed.
pub fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    match origin {
        _ if allowed.is_empty() => true,
        None => true,
        Some(origin) => allowed.iter().any(|a| a == "*" || a.eq_ignore_ascii_case(origin)),
    }
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    if !origin_allowed(&state.allowed_origins, origin) {
        warn!(origin = origin.unwrap_or_default(), "rejecting websocket from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(error = %rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| shutdown.track(run_session(socket, state)))
}

async fn run_session(socket: WebSocket, state: AppState) {
    let (sink, source) = split_websocket(socket);
    let session = Session::new(
        format!("client_{}", Uuid::now_v7()),
        state.cluster,
        state.relay.as_ref().clone(),
        &state.shutdown.token(),
    );
    let _ = session.run(sink, source).await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let k8s_connected = state.cluster.is_healthy().await;
    Json(health::health_check(
        state.start_time,
        k8s_connected,
        state.shutdown.active_sessions(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}
