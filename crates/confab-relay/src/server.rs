//! Router assembly and serving.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::relay::{ws_handler, RelayState, SharedState};

#[derive(Serialize)]
struct RuntimeMetrics {
    open_sockets: usize,
    registered_users: usize,
}

/// Fresh, empty relay state. Everything in it dies with the process.
pub fn new_state() -> SharedState {
    Arc::new(RwLock::new(RelayState::new()))
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.read().await;
    Json(RuntimeMetrics {
        open_sockets: guard.open_sockets(),
        registered_users: guard.directory.len(),
    })
}

/// Build the relay router: the WebSocket endpoint plus `/health`.
///
/// CORS is permissive: clients connect from arbitrary origins and the relay
/// carries only opaque payloads.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the relay on an already-bound listener.
///
/// Taking the listener lets tests bind `127.0.0.1:0` and read the port back
/// before serving.
pub async fn serve(listener: TcpListener, state: SharedState) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
