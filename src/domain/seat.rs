//! Seat record and its status state machine values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, HoldToken, SeatId};

/// Public status of a seat.
///
/// Serialized with the names clients already know: a held seat is
/// `"reserved"` and a sold seat is `"booked"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum SeatStatus {
    /// Free to be held.
    #[serde(rename = "available")]
    Available,
    /// Temporarily claimed by one party.
    #[serde(rename = "reserved")]
    Held,
    /// Permanently sold. Terminal.
    #[serde(rename = "booked")]
    Sold,
}

impl SeatStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Held => "reserved",
            Self::Sold => "booked",
        }
    }
}

/// Mutable part of a seat.
///
/// The hold token and expiry exist only inside [`SeatState::Held`], so a
/// seat can never carry hold fields while available or sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatState {
    /// Free to be held.
    Available,
    /// Leased to `token` until `expires_at`.
    Held {
        /// Current holder.
        token: HoldToken,
        /// Instant at which the lease lapses.
        expires_at: DateTime<Utc>,
    },
    /// Permanently sold.
    Sold,
}

/// A seat within an event.
///
/// `id`, `event_id`, `row` and `number` are fixed at setup; only `state`
/// changes, and only through the transition authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    /// Unique seat identifier.
    pub id: SeatId,
    /// Owning event.
    pub event_id: EventId,
    /// Row ordinal (primary sort key).
    pub row: i32,
    /// Seat ordinal within the row (secondary sort key).
    pub number: i32,
    /// Current state.
    pub state: SeatState,
}

impl Seat {
    /// Creates an available seat.
    #[must_use]
    pub const fn new(id: SeatId, event_id: EventId, row: i32, number: i32) -> Self {
        Self {
            id,
            event_id,
            row,
            number,
            state: SeatState::Available,
        }
    }

    /// Returns the public status.
    #[must_use]
    pub const fn status(&self) -> SeatStatus {
        match self.state {
            SeatState::Available => SeatStatus::Available,
            SeatState::Held { .. } => SeatStatus::Held,
            SeatState::Sold => SeatStatus::Sold,
        }
    }

    /// Returns the holder's token while held.
    #[must_use]
    pub const fn hold_token(&self) -> Option<HoldToken> {
        match self.state {
            SeatState::Held { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Returns the lease expiry while held.
    #[must_use]
    pub const fn hold_expires_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SeatState::Held { expires_at, .. } => Some(expires_at),
            _ => None,
        }
    }

    /// Returns `true` if the seat is held and its lease has lapsed at `now`.
    #[must_use]
    pub fn lease_lapsed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, SeatState::Held { expires_at, .. } if now >= expires_at)
    }

    /// Returns the `(row, number)` sort key.
    #[must_use]
    pub const fn position(&self) -> (i32, i32) {
        (self.row, self.number)
    }

    /// Returns a copy of this seat with a different state.
    #[must_use]
    pub fn with_state(&self, state: SeatState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// Returns `true` if both records describe the same physical seat.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.id == other.id
            && self.event_id == other.event_id
            && self.row == other.row
            && self.number == other.number
    }
}

/// A seat record together with its store version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSeat {
    /// The record.
    pub seat: Seat,
    /// Monotonic write counter, starting at 1.
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn seat() -> Seat {
        Seat::new(SeatId::new(1), EventId::new(1), 1, 1)
    }

    #[test]
    fn new_seat_is_available_without_hold_fields() {
        let s = seat();
        assert_eq!(s.status(), SeatStatus::Available);
        assert!(s.hold_token().is_none());
        assert!(s.hold_expires_at().is_none());
    }

    #[test]
    fn held_seat_exposes_hold_fields() {
        let token = HoldToken::new();
        let expires_at = Utc::now() + TimeDelta::seconds(60);
        let s = seat().with_state(SeatState::Held { token, expires_at });
        assert_eq!(s.status(), SeatStatus::Held);
        assert_eq!(s.hold_token(), Some(token));
        assert_eq!(s.hold_expires_at(), Some(expires_at));
    }

    #[test]
    fn lease_lapses_at_expiry_instant() {
        let now = Utc::now();
        let s = seat().with_state(SeatState::Held {
            token: HoldToken::new(),
            expires_at: now + TimeDelta::seconds(1),
        });
        assert!(!s.lease_lapsed(now));
        assert!(s.lease_lapsed(now + TimeDelta::seconds(1)));
        assert!(!seat().lease_lapsed(now));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(SeatStatus::Held.as_str(), "reserved");
        let json = serde_json::to_string(&SeatStatus::Sold).unwrap_or_default();
        assert_eq!(json, "\"booked\"");
    }

    #[test]
    fn identity_ignores_state() {
        let a = seat();
        let b = a.with_state(SeatState::Sold);
        assert!(a.same_identity(&b));
        let moved = Seat::new(SeatId::new(1), EventId::new(1), 2, 1);
        assert!(!a.same_identity(&moved));
    }
}
