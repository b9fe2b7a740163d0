//! Committed seat transitions.
//!
//! Every successful store write produces a [`SeatChange`] on the commit
//! feed. The change distributor fans these out to live subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EventId, SeatId, SeatStatus, VersionedSeat};

/// Why a seat changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// `Available → Held`.
    Held,
    /// `Held → Available` after the lease lapsed.
    Expired,
    /// `Held → Sold`.
    Sold,
    /// Any other status pair. Only a direct [`SeatStore::compare_and_swap`]
    /// can write one; the transition authority never does.
    ///
    /// [`SeatStore::compare_and_swap`]: super::SeatStore::compare_and_swap
    Rewritten,
}

impl ChangeCause {
    /// Derives the cause from the status before and after a write.
    #[must_use]
    pub const fn between(previous: SeatStatus, next: SeatStatus) -> Self {
        match (previous, next) {
            (SeatStatus::Available, SeatStatus::Held) => Self::Held,
            (SeatStatus::Held, SeatStatus::Available) => Self::Expired,
            (SeatStatus::Held, SeatStatus::Sold) => Self::Sold,
            _ => Self::Rewritten,
        }
    }
}

/// A committed transition of one seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatChange {
    /// The record as written, with its new version.
    pub record: VersionedSeat,
    /// Status before the write.
    pub previous: SeatStatus,
    /// Derived reason.
    pub cause: ChangeCause,
    /// Clock reading at commit.
    pub committed_at: DateTime<Utc>,
}

impl SeatChange {
    /// Returns the seat identifier.
    #[must_use]
    pub const fn seat_id(&self) -> SeatId {
        self.record.seat.id
    }

    /// Returns the owning event.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.record.seat.event_id
    }

    /// Returns the store version written by this change.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.record.version
    }
}
