//! REST API layer: route handlers, DTOs, router composition, and the
//! OpenAPI document.
//!
//! Seat endpoints are mounted at the root, as existing seat-map clients
//! expect.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use tower_http::timeout::TimeoutLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI document of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "seatmap-gateway",
        description = "Seat inventory with leased holds and live seat-map feeds."
    ),
    paths(
        handlers::seats::list_event_seats,
        handlers::seats::get_seat,
        handlers::seats::reserve_seat,
        handlers::seats::book_seat,
        handlers::stream::stream_event_seats,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::SeatDto,
        dto::HoldAckDto,
        dto::BookAckDto,
        handlers::system::HealthResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Seats", description = "Seat listing, reservation and booking"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router.
///
/// `request_timeout` applies to every route except the SSE stream.
pub fn build_router(request_timeout: Duration) -> Router<AppState> {
    let bounded = Router::new()
        .merge(handlers::seats::routes())
        .merge(handlers::system::routes())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ));

    let router = Router::new()
        .merge(bounded)
        .merge(handlers::stream::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
