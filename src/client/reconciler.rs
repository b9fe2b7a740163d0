//! Local seat list kept coherent from snapshots and deltas.

use std::collections::BTreeMap;

use crate::domain::{EventId, SeatChange, SeatId, VersionedSeat};
use crate::error::InventoryError;
use crate::service::Notification;

/// One viewer's local copy of an event's seats.
///
/// The list only changes through [`SeatReconciler::apply`]: a hold or
/// book request issued by the viewer never touches it directly, the
/// confirmed change comes back through the feed like anyone else's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeatReconciler {
    event_id: Option<EventId>,
    seats: BTreeMap<(i32, i32), VersionedSeat>,
    synced: bool,
}

impl SeatReconciler {
    /// Creates an empty, unsynchronised view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one notification from a subscription.
    ///
    /// # Errors
    ///
    /// See [`SeatReconciler::apply_delta`].
    pub fn apply(&mut self, notification: Notification) -> Result<(), InventoryError> {
        match notification {
            Notification::Snapshot { event_id, seats } => {
                self.apply_snapshot(event_id, seats);
                Ok(())
            }
            Notification::Delta(change) => self.apply_delta(&change).map(|_| ()),
        }
    }

    /// Replaces the whole list. Applying the same snapshot twice leaves the
    /// same state.
    pub fn apply_snapshot(&mut self, event_id: EventId, seats: Vec<VersionedSeat>) {
        self.event_id = Some(event_id);
        self.seats = seats
            .into_iter()
            .map(|record| (record.seat.position(), record))
            .collect();
        self.synced = true;
    }

    /// Merges one change. Returns `false` for stale or duplicate changes.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransportInterrupted`] if no snapshot has
    /// been applied since the last interruption, and
    /// [`InventoryError::InvalidArgument`] if the change belongs to another
    /// event.
    pub fn apply_delta(&mut self, change: &SeatChange) -> Result<bool, InventoryError> {
        if !self.synced {
            return Err(InventoryError::TransportInterrupted(
                "delta received before a snapshot; resynchronise".to_string(),
            ));
        }
        if self.event_id != Some(change.event_id()) {
            return Err(InventoryError::InvalidArgument(format!(
                "delta for event {} applied to another event's view",
                change.event_id()
            )));
        }

        let position = change.record.seat.position();
        if let Some(local) = self.seats.get(&position)
            && local.version >= change.version()
        {
            return Ok(false);
        }
        self.seats.insert(position, change.record.clone());
        Ok(true)
    }

    /// Marks the view stale after a lost feed. The last known list stays
    /// readable, but deltas are refused until the next snapshot.
    pub fn invalidate(&mut self) {
        self.synced = false;
    }

    /// Returns `true` if a snapshot has been applied since the last
    /// interruption.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.synced
    }

    /// Event this view follows, once known.
    #[must_use]
    pub const fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    /// Seats ordered by row, then number.
    pub fn seats(&self) -> impl Iterator<Item = &VersionedSeat> {
        self.seats.values()
    }

    /// Looks up one seat by id.
    #[must_use]
    pub fn get(&self, seat_id: SeatId) -> Option<&VersionedSeat> {
        self.seats.values().find(|record| record.seat.id == seat_id)
    }

    /// Number of seats in view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Returns `true` if the view holds no seats.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}
