//! Version-tagged seat storage with per-seat fine-grained locking.
//!
//! [`SeatStore`] is the single source of truth for seat state. Each record
//! sits behind its own [`tokio::sync::RwLock`] and carries a version
//! counter; [`SeatStore::compare_and_swap`] is the only way to change it.
//! The store performs no business validation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{ChangeCause, Clock, CommitFeed, EventId, Seat, SeatChange, SeatId, VersionedSeat};
use crate::error::InventoryError;

#[derive(Debug, Default)]
struct Index {
    seats: HashMap<SeatId, Arc<RwLock<VersionedSeat>>>,
    events: HashMap<EventId, BTreeMap<(i32, i32), SeatId>>,
}

/// Central store for all seats of all events.
///
/// # Concurrency
///
/// - Reads of the same seat run concurrently.
/// - Writes to different seats run concurrently.
/// - A write holds only its own seat's lock, and only for the swap.
/// - Every committed write is published on the commit feed while that
///   lock is held, so the feed carries each seat's versions in order.
///
/// Listings read seats one after another; each entry is internally
/// consistent and versioned, but two entries may straddle a commit.
#[derive(Debug)]
pub struct SeatStore {
    index: RwLock<Index>,
    commits: CommitFeed,
    clock: Arc<dyn Clock>,
}

impl SeatStore {
    /// Creates an empty store publishing commits on `commits`.
    #[must_use]
    pub fn new(commits: CommitFeed, clock: Arc<dyn Clock>) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            commits,
            clock,
        }
    }

    /// Returns the commit feed.
    #[must_use]
    pub fn commits(&self) -> &CommitFeed {
        &self.commits
    }

    /// Makes an event known. Returns `false` if it already was.
    pub async fn register_event(&self, event_id: EventId) -> bool {
        let mut index = self.index.write().await;
        if index.events.contains_key(&event_id) {
            return false;
        }
        index.events.insert(event_id, BTreeMap::new());
        true
    }

    /// Inserts a new seat at version 1, registering its event if needed.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if the seat id is taken
    /// or another seat of the same event already sits at that row and
    /// number.
    pub async fn insert(&self, seat: Seat) -> Result<VersionedSeat, InventoryError> {
        let mut index = self.index.write().await;
        if index.seats.contains_key(&seat.id) {
            return Err(InventoryError::InvalidArgument(format!(
                "seat {} already exists",
                seat.id
            )));
        }
        let positions = index.events.entry(seat.event_id).or_default();
        if positions.contains_key(&seat.position()) {
            return Err(InventoryError::InvalidArgument(format!(
                "event {} already has a seat at row {} number {}",
                seat.event_id, seat.row, seat.number
            )));
        }
        positions.insert(seat.position(), seat.id);

        let record = VersionedSeat { seat, version: 1 };
        index
            .seats
            .insert(record.seat.id, Arc::new(RwLock::new(record.clone())));
        Ok(record)
    }

    /// Seeds `rows × seats_per_row` available seats for `event_id`.
    ///
    /// Seat ids continue after the highest id already stored. Rows and
    /// numbers start at 1.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if a generated seat
    /// collides with an existing one.
    pub async fn seed_grid(
        &self,
        event_id: EventId,
        rows: i32,
        seats_per_row: i32,
    ) -> Result<Vec<SeatId>, InventoryError> {
        self.register_event(event_id).await;
        let mut next_id = {
            let index = self.index.read().await;
            index
                .seats
                .keys()
                .map(|id| id.get())
                .max()
                .unwrap_or(0)
                .saturating_add(1)
        };

        let mut created = Vec::new();
        for row in 1..=rows {
            for number in 1..=seats_per_row {
                let seat = Seat::new(SeatId::new(next_id), event_id, row, number);
                self.insert(seat).await?;
                created.push(SeatId::new(next_id));
                next_id = next_id.saturating_add(1);
            }
        }
        Ok(created)
    }

    /// Returns a copy of the seat record and its version.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::SeatNotFound`] if no such seat exists.
    pub async fn get(&self, seat_id: SeatId) -> Result<VersionedSeat, InventoryError> {
        let entry = self.entry(seat_id).await?;
        let record = entry.read().await;
        Ok(record.clone())
    }

    /// Returns every seat of the event ordered by row, then number.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::EventNotFound`] if the event is unknown.
    pub async fn list_by_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<VersionedSeat>, InventoryError> {
        let entries: Vec<Arc<RwLock<VersionedSeat>>> = {
            let index = self.index.read().await;
            let positions = index
                .events
                .get(&event_id)
                .ok_or(InventoryError::EventNotFound(event_id))?;
            positions
                .values()
                .filter_map(|id| index.seats.get(id).map(Arc::clone))
                .collect()
        };

        let mut seats = Vec::with_capacity(entries.len());
        for entry in entries {
            seats.push(entry.read().await.clone());
        }
        Ok(seats)
    }

    /// Replaces the record if its version still equals `expected_version`.
    ///
    /// On success the version is incremented, the change is published on
    /// the commit feed, and the new record is returned.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::SeatNotFound`] if no such seat exists.
    /// - [`InventoryError::VersionConflict`] if the record moved on.
    /// - [`InventoryError::InvalidArgument`] if `new_record` changes the
    ///   seat's id, event, row or number.
    pub async fn compare_and_swap(
        &self,
        seat_id: SeatId,
        expected_version: u64,
        new_record: Seat,
    ) -> Result<VersionedSeat, InventoryError> {
        let entry = self.entry(seat_id).await?;
        let mut current = entry.write().await;

        if current.version != expected_version {
            return Err(InventoryError::VersionConflict {
                seat_id,
                expected: expected_version,
                actual: current.version,
            });
        }
        if !current.seat.same_identity(&new_record) {
            return Err(InventoryError::InvalidArgument(format!(
                "record for seat {seat_id} must keep its identity"
            )));
        }

        let previous = current.seat.status();
        current.seat = new_record;
        current.version = current.version.saturating_add(1);
        let committed = current.clone();

        let _ = self.commits.publish(SeatChange {
            cause: ChangeCause::between(previous, committed.seat.status()),
            previous,
            record: committed.clone(),
            committed_at: self.clock.now(),
        });

        Ok(committed)
    }

    /// Returns every seat currently held, across all events.
    pub async fn held_seats(&self) -> Vec<VersionedSeat> {
        let entries: Vec<Arc<RwLock<VersionedSeat>>> = {
            let index = self.index.read().await;
            index.seats.values().map(Arc::clone).collect()
        };

        let mut held = Vec::new();
        for entry in entries {
            let record = entry.read().await;
            if record.seat.hold_token().is_some() {
                held.push(record.clone());
            }
        }
        held
    }

    /// Returns `true` if the event is known.
    pub async fn contains_event(&self, event_id: EventId) -> bool {
        self.index.read().await.events.contains_key(&event_id)
    }

    /// Returns the number of seats in the store.
    pub async fn len(&self) -> usize {
        self.index.read().await.seats.len()
    }

    /// Returns `true` if the store holds no seats.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.seats.is_empty()
    }

    async fn entry(&self, seat_id: SeatId) -> Result<Arc<RwLock<VersionedSeat>>, InventoryError> {
        let index = self.index.read().await;
        index
            .seats
            .get(&seat_id)
            .map(Arc::clone)
            .ok_or(InventoryError::SeatNotFound(seat_id))
    }
}
