//! WebSocket message types: envelope, commands, and feed payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::dto::SeatDto;
use crate::domain::{ChangeCause, EventId, SeatChange, SeatStatus, VersionedSeat};
use crate::service::Notification;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a server message with the current timestamp.
    #[must_use]
    pub fn new(id: String, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds a server event with a fresh ID.
    #[must_use]
    pub fn event(payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), WsMessageType::Event, payload)
    }

    /// Builds an error reply carrying `code` and `message`.
    #[must_use]
    pub fn error(id: String, code: u16, message: impl Into<String>) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message.into() }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client feed event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope's payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Follow the seat maps of these events.
    Subscribe {
        /// Events to follow.
        event_ids: Vec<EventId>,
    },
    /// Stop following these events.
    Unsubscribe {
        /// Events to drop.
        event_ids: Vec<EventId>,
    },
    /// Read an event's seat list once.
    GetSeats {
        /// Event to read.
        event_id: EventId,
    },
}

/// Payload of an `event` message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedPayload {
    /// Full ordered seat list; first message of every subscription.
    Snapshot {
        /// Event the seats belong to.
        event_id: EventId,
        /// Seats ordered by row, then number.
        seats: Vec<SeatDto>,
    },
    /// One committed change.
    Delta {
        /// Event the seat belongs to.
        event_id: EventId,
        /// Seat after the change.
        seat: SeatDto,
        /// Store version written by the change.
        version: u64,
        /// Status before the change.
        previous: SeatStatus,
        /// Why the seat changed.
        cause: ChangeCause,
        /// Commit instant.
        committed_at: DateTime<Utc>,
    },
}

impl FeedPayload {
    /// Builds a snapshot payload.
    #[must_use]
    pub fn snapshot(event_id: EventId, seats: &[VersionedSeat]) -> Self {
        Self::Snapshot {
            event_id,
            seats: seats.iter().map(|r| SeatDto::from(&r.seat)).collect(),
        }
    }

    /// Builds a delta payload.
    #[must_use]
    pub fn delta(change: &SeatChange) -> Self {
        Self::Delta {
            event_id: change.event_id(),
            seat: SeatDto::from(&change.record.seat),
            version: change.version(),
            previous: change.previous,
            cause: change.cause,
            committed_at: change.committed_at,
        }
    }
}

impl From<&Notification> for FeedPayload {
    fn from(notification: &Notification) -> Self {
        match notification {
            Notification::Snapshot { event_id, seats } => Self::snapshot(*event_id, seats),
            Notification::Delta(change) => Self::delta(change),
        }
    }
}
