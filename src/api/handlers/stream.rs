//! Server-Sent Events feed of an event's seat map.
//!
//! Each `data:` frame carries the full ordered seat list. The first frame
//! is the snapshot; every later frame is the state after one change. When
//! the subscription is interrupted an `interrupted` event is sent and the
//! stream ends, so the client reconnects and starts from a new snapshot.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;

use crate::api::dto::SeatDto;
use crate::app_state::AppState;
use crate::client::SeatReconciler;
use crate::domain::EventId;
use crate::error::{ErrorResponse, InventoryError};

/// `GET /events/{event_id}/seats/stream` — Live seat map.
///
/// # Errors
///
/// Returns [`InventoryError::EventNotFound`] for unknown events.
#[utoipa::path(
    get,
    path = "/events/{event_id}/seats/stream",
    tag = "Seats",
    summary = "Stream an event's seat map",
    description = "Server-Sent Events. Every message is the full seat list ordered by row, then number: first the current snapshot, then the new state after each committed change.",
    params(("event_id" = i64, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Event stream of seat lists", content_type = "text/event-stream", body = Vec<SeatDto>),
        (status = 404, description = "Unknown event", body = ErrorResponse),
    )
)]
pub async fn stream_event_seats(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, InventoryError> {
    let event_id = EventId::new(event_id);
    let mut subscription = state.distributor.subscribe(event_id).await?;
    tracing::debug!(%event_id, subscriber = subscription.id(), "sse client connected");

    let frames = async_stream::stream! {
        let mut view = SeatReconciler::new();
        loop {
            let applied = match subscription.next().await {
                Ok(notification) => view.apply(notification),
                Err(err) => Err(err),
            };
            if let Err(err) = applied {
                tracing::warn!(%event_id, error = %err, "sse feed interrupted");
                yield Ok(Event::default().event("interrupted").data(err.to_string()));
                break;
            }

            let seats: Vec<SeatDto> = view.seats().map(|r| SeatDto::from(&r.seat)).collect();
            yield Event::default().json_data(&seats);
        }
    };

    Ok(Sse::new(frames).keep_alive(KeepAlive::new().interval(state.sse_keepalive)))
}

/// Streaming routes. Kept apart so the request timeout does not apply.
pub fn routes() -> Router<AppState> {
    Router::new().route("/events/{event_id}/seats/stream", get(stream_event_seats))
}
