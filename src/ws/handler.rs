//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("ws client connecting");
    ws.on_upgrade(move |socket| run_connection(socket, state))
}

/// WebSocket route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
