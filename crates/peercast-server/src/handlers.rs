//! HTTP routes for the Peercast server.
//!
//! This module authenticates room connections, upgrades them to WebSockets
//! and hands them to the hub.

use crate::auth::{AuthError, RoomTokens};
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use peercast_core::{Account, Hub};
use peercast_transport::AxumConnection;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the live room gauge is refreshed.
const ROOM_GAUGE_INTERVAL: Duration = Duration::from_secs(15);

/// Shared server state.
pub struct AppState {
    /// The room registry.
    pub hub: Arc<Hub>,
    /// Room token verifier.
    pub tokens: RoomTokens,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, hub: Arc<Hub>) -> Self {
        let tokens = RoomTokens::new(
            config.auth.room_secret.as_bytes(),
            Duration::from_secs(config.auth.token_ttl_secs),
        );
        Self {
            hub,
            tokens,
            config,
        }
    }

    /// Check the room id and token of a connection attempt.
    fn authorize(&self, room_id: &str, token: &str) -> Result<Account, Rejection> {
        if Uuid::parse_str(room_id).is_err() {
            return Err(Rejection::BadRoomId);
        }
        if token.is_empty() {
            return Err(Rejection::EmptyToken);
        }
        self.tokens.verify(token, room_id).map_err(Rejection::BadToken)
    }
}

/// Why a connection attempt was refused before the upgrade.
#[derive(Debug)]
enum Rejection {
    BadRoomId,
    EmptyToken,
    BadToken(AuthError),
}

impl Rejection {
    fn reason(&self) -> &'static str {
        match self {
            Rejection::BadRoomId => "room_id",
            Rejection::EmptyToken => "empty_token",
            Rejection::BadToken(e) => e.reason(),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Rejection::BadRoomId => (StatusCode::BAD_REQUEST, "corrupted room id (uuid expected)"),
            Rejection::EmptyToken => (StatusCode::BAD_REQUEST, "empty room token"),
            Rejection::BadToken(_) => (StatusCode::UNAUTHORIZED, "corrupted room token"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(default)]
    token: String,
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/room/ws/:room_id", get(ws_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let hub = Arc::new(Hub::default());
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&hub)));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Peercast server listening on {}", addr);
    info!("Room endpoint: ws://{}/api/room/ws/{{room_id}}?token=...", addr);

    serve(listener, state, shutdown_signal()).await
}

/// Serve on `listener` until `signal` resolves, then stop every room.
///
/// # Errors
///
/// Returns an error if the HTTP server fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = Arc::clone(&state.hub);
    let cleanup = hub.spawn_cleanup();
    let room_gauge = spawn_room_gauge(Arc::clone(&hub));

    let app = router(state);
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await;

    hub.shutdown();
    room_gauge.abort();
    if let Err(e) = cleanup.await {
        warn!(error = %e, "Room cleanup task failed");
    }
    metrics::set_active_rooms(0);

    result.context("HTTP server failed")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

fn spawn_room_gauge(hub: Arc<Hub>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ROOM_GAUGE_INTERVAL);
        loop {
            ticker.tick().await;
            metrics::set_active_rooms(hub.room_count());
        }
    })
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Authenticate and upgrade a room connection.
async fn ws_handler(
    Path(room_id): Path<String>,
    Query(params): Query<WsParams>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let remote = connect_info.map(|ConnectInfo(addr)| addr);

    let account = match state.authorize(&room_id, &params.token) {
        Ok(account) => account,
        Err(rejection) => {
            debug!(room = %room_id, remote = ?remote, reason = rejection.reason(), "Room connection refused");
            metrics::record_rejection(rejection.reason());
            return rejection.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(room = %room_id, remote = ?remote, "Not a WebSocket upgrade");
            metrics::record_rejection("not_websocket");
            return rejection.into_response();
        }
    };

    ws.max_message_size(state.config.limits.max_message_size)
        .on_failed_upgrade(|e| {
            warn!(error = %e, "WebSocket upgrade failed");
            metrics::record_error("upgrade");
        })
        .on_upgrade(move |socket| async move {
            let _metrics_guard = ConnectionMetricsGuard::new();

            let mut connection = AxumConnection::new(socket);
            if let Some(addr) = remote {
                connection = connection.with_remote_addr(addr);
            }

            debug!(room = %room_id, account = account.id, "WebSocket connected");
            state.hub.handle(account, &room_id, Box::new(connection)).await;
            debug!(room = %room_id, "WebSocket disconnected");
        })
}
