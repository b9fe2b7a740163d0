//! Seat handlers: list, get, reserve, book.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{BookAckDto, BookParams, HoldAckDto, ReserveParams, SeatDto};
use crate::app_state::AppState;
use crate::domain::{EventId, SeatId};
use crate::error::{ErrorResponse, InventoryError};

/// `GET /events/{event_id}/seats` — Ordered seat list of an event.
///
/// # Errors
///
/// Returns [`InventoryError::EventNotFound`] for unknown events.
#[utoipa::path(
    get,
    path = "/events/{event_id}/seats",
    tag = "Seats",
    summary = "List an event's seats",
    description = "Returns every seat of the event ordered by row, then number. Lapsed reservations are released before the list is read.",
    params(("event_id" = i64, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Ordered seat list", body = Vec<SeatDto>),
        (status = 404, description = "Unknown event", body = ErrorResponse),
    )
)]
pub async fn list_event_seats(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, InventoryError> {
    let seats = state
        .distributor
        .snapshot(EventId::new(event_id))
        .await?;
    let body: Vec<SeatDto> = seats.iter().map(|r| SeatDto::from(&r.seat)).collect();
    Ok((StatusCode::OK, Json(body)))
}

/// `GET /seats/{seat_id}` — One seat.
///
/// # Errors
///
/// Returns [`InventoryError::SeatNotFound`] for unknown seats.
#[utoipa::path(
    get,
    path = "/seats/{seat_id}",
    tag = "Seats",
    summary = "Get a seat",
    params(("seat_id" = i64, Path, description = "Seat identifier")),
    responses(
        (status = 200, description = "Current seat state", body = SeatDto),
        (status = 404, description = "Unknown seat", body = ErrorResponse),
    )
)]
pub async fn get_seat(
    State(state): State<AppState>,
    Path(seat_id): Path<i64>,
) -> Result<impl IntoResponse, InventoryError> {
    let record = state.authority.get(SeatId::new(seat_id)).await?;
    Ok((StatusCode::OK, Json(SeatDto::from(&record.seat))))
}

/// `POST /seats/{seat_id}/reserve` — Place a temporary hold.
///
/// # Errors
///
/// - [`InventoryError::InvalidArgument`] for a malformed duration or token.
/// - [`InventoryError::SeatNotFound`] for unknown seats.
/// - [`InventoryError::Conflict`] if the seat is not available.
#[utoipa::path(
    post,
    path = "/seats/{seat_id}/reserve",
    tag = "Seats",
    summary = "Reserve a seat",
    description = "Holds an available seat for `duration` seconds (default from configuration). The returned token must be presented to book the seat before the hold expires.",
    params(
        ("seat_id" = i64, Path, description = "Seat identifier"),
        ReserveParams,
    ),
    responses(
        (status = 200, description = "Seat reserved", body = HoldAckDto),
        (status = 400, description = "Invalid duration or token", body = ErrorResponse),
        (status = 404, description = "Unknown seat", body = ErrorResponse),
        (status = 409, description = "Seat not available", body = ErrorResponse),
    )
)]
pub async fn reserve_seat(
    State(state): State<AppState>,
    Path(seat_id): Path<i64>,
    Query(params): Query<ReserveParams>,
) -> Result<impl IntoResponse, InventoryError> {
    let duration = state.leases.duration_from_secs(params.duration_secs()?)?;
    let token = params.token_or_new()?;

    let grant = state
        .authority
        .hold(SeatId::new(seat_id), token, duration)
        .await?;

    Ok((StatusCode::OK, Json(HoldAckDto::from(&grant))))
}

/// `POST /seats/{seat_id}/book` — Sell a reserved seat to its holder.
///
/// # Errors
///
/// - [`InventoryError::InvalidArgument`] for a missing or malformed token.
/// - [`InventoryError::SeatNotFound`] for unknown seats.
/// - [`InventoryError::Conflict`] unless the seat is reserved by `token`.
#[utoipa::path(
    post,
    path = "/seats/{seat_id}/book",
    tag = "Seats",
    summary = "Book a reserved seat",
    params(
        ("seat_id" = i64, Path, description = "Seat identifier"),
        BookParams,
    ),
    responses(
        (status = 200, description = "Seat booked", body = BookAckDto),
        (status = 400, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Unknown seat", body = ErrorResponse),
        (status = 409, description = "Seat not reserved by this token", body = ErrorResponse),
    )
)]
pub async fn book_seat(
    State(state): State<AppState>,
    Path(seat_id): Path<i64>,
    Query(params): Query<BookParams>,
) -> Result<impl IntoResponse, InventoryError> {
    let token = params.token()?;
    let record = state
        .authority
        .finalize(SeatId::new(seat_id), token)
        .await?;
    Ok((StatusCode::OK, Json(BookAckDto::from(&record.seat))))
}

/// Seat routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{event_id}/seats", get(list_event_seats))
        .route("/seats/{seat_id}", get(get_seat))
        .route("/seats/{seat_id}/reserve", post(reserve_seat))
        .route("/seats/{seat_id}/book", post(book_seat))
}
