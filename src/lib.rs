//! # seatmap-gateway
//!
//! Seat inventory service for ticketed events: REST endpoints to list,
//! reserve and book seats, plus live seat-map feeds over Server-Sent Events
//! and WebSocket.
//!
//! A seat is `available`, `reserved` (held by one party until its lease
//! lapses) or `booked`. Every change goes through a compare-and-swap on a
//! version-tagged record, so two parties can never hold or buy the same
//! seat, and every viewer sees each seat's changes in commit order.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, SSE, WebSocket)
//!     │
//!     ├── REST + SSE Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── ChangeDistributor ── Subscription ── SeatReconciler (client/)
//!     ├── TransitionAuthority + LeaseManager (service/)
//!     │
//!     ├── CommitFeed (commit feed)
//!     └── SeatStore (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the full HTTP application: REST, SSE and WebSocket routes with
/// request tracing and permissive CORS.
pub fn build_app(state: AppState, request_timeout: std::time::Duration) -> Router {
    Router::new()
        .merge(api::build_router(request_timeout))
        .merge(ws::handler::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
