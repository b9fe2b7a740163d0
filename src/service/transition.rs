//! Transition authority: the only mutator of the seat store.
//!
//! Every transition reads the record, evaluates its guard against the
//! injected clock, and writes back with compare-and-swap. Version races
//! are retried a bounded number of times and never reach the caller; guard
//! failures surface as [`InventoryError::Conflict`].
//!
//! ```text
//!             hold(token, d)               finalize(token)
//! Available ────────────────► Held ───────────────────────► Sold
//!     ▲                         │
//!     └──────── expire ─────────┘   (now ≥ expires_at)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::LeaseManager;
use crate::domain::{
    Clock, EventId, HoldToken, Seat, SeatId, SeatState, SeatStore, VersionedSeat,
};
use crate::error::InventoryError;

/// Acknowledgment returned to the party that obtained a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldGrant {
    /// Held seat.
    pub seat_id: SeatId,
    /// Event owning the seat.
    pub event_id: EventId,
    /// Token that must be presented to finalize.
    pub token: HoldToken,
    /// Instant the hold lapses.
    pub expires_at: DateTime<Utc>,
    /// Store version written by the hold.
    pub version: u64,
}

/// Validates and applies every seat state change.
#[derive(Debug)]
pub struct TransitionAuthority {
    store: Arc<SeatStore>,
    leases: LeaseManager,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl TransitionAuthority {
    /// Creates an authority over `store`.
    ///
    /// `max_retries` bounds how many version races one call absorbs before
    /// reporting a conflict.
    #[must_use]
    pub fn new(
        store: Arc<SeatStore>,
        leases: LeaseManager,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            leases,
            clock,
            max_retries,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<SeatStore> {
        &self.store
    }

    /// Returns the lease policy.
    #[must_use]
    pub const fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Reads one seat, expiring its hold first if it has lapsed.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::SeatNotFound`] for unknown seats, or
    /// [`InventoryError::Conflict`] if the lazy expiry kept losing races.
    pub async fn get(&self, seat_id: SeatId) -> Result<VersionedSeat, InventoryError> {
        let (record, _) = self.transition(seat_id, "read", |_, _| Ok(None)).await?;
        Ok(record)
    }

    /// Lists an event's seats in row/number order with lapsed holds expired.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::EventNotFound`] for unknown events.
    pub async fn list_by_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<VersionedSeat>, InventoryError> {
        let records = self.store.list_by_event(event_id).await?;
        let now = self.clock.now();

        let mut seats = Vec::with_capacity(records.len());
        for record in records {
            if record.seat.lease_lapsed(now) {
                seats.push(self.get(record.seat.id).await?);
            } else {
                seats.push(record);
            }
        }
        Ok(seats)
    }

    /// Places a hold on an available seat.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidArgument`] if `duration` is zero or above
    ///   the configured maximum.
    /// - [`InventoryError::SeatNotFound`] for unknown seats.
    /// - [`InventoryError::Conflict`] if the seat is held (by anyone,
    ///   including `token`) or sold.
    pub async fn hold(
        &self,
        seat_id: SeatId,
        token: HoldToken,
        duration: Duration,
    ) -> Result<HoldGrant, InventoryError> {
        self.leases.validate(duration)?;

        let (record, _) = self
            .transition(seat_id, "hold", |seat, now| match seat.state {
                SeatState::Available => self.leases.grant(seat, token, duration, now).map(Some),
                SeatState::Held { .. } => Err(InventoryError::Conflict(format!(
                    "seat {} is already reserved",
                    seat.id
                ))),
                SeatState::Sold => Err(InventoryError::Conflict(format!(
                    "seat {} is already booked",
                    seat.id
                ))),
            })
            .await?;

        let expires_at = record.seat.hold_expires_at().ok_or_else(|| {
            InventoryError::Internal(format!("seat {seat_id} committed without a hold"))
        })?;
        tracing::info!(
            %seat_id,
            event_id = %record.seat.event_id,
            version = record.version,
            %expires_at,
            "seat reserved"
        );

        Ok(HoldGrant {
            seat_id,
            event_id: record.seat.event_id,
            token,
            expires_at,
            version: record.version,
        })
    }

    /// Sells a seat to the party currently holding it.
    ///
    /// A hold that has lapsed counts as gone, even if nobody else has
    /// touched the seat since.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::SeatNotFound`] for unknown seats.
    /// - [`InventoryError::Conflict`] unless the seat is held by `token`.
    pub async fn finalize(
        &self,
        seat_id: SeatId,
        token: HoldToken,
    ) -> Result<VersionedSeat, InventoryError> {
        let (record, _) = self
            .transition(seat_id, "finalize", |seat, _| match seat.state {
                SeatState::Held { token: holder, .. } if holder == token => {
                    Ok(Some(seat.with_state(SeatState::Sold)))
                }
                SeatState::Held { .. } => Err(InventoryError::Conflict(format!(
                    "seat {} is reserved by another party",
                    seat.id
                ))),
                SeatState::Available => Err(InventoryError::Conflict(format!(
                    "seat {} is not reserved; the hold may have expired",
                    seat.id
                ))),
                SeatState::Sold => Err(InventoryError::Conflict(format!(
                    "seat {} is already booked",
                    seat.id
                ))),
            })
            .await?;

        tracing::info!(
            %seat_id,
            event_id = %record.seat.event_id,
            version = record.version,
            "seat booked"
        );
        Ok(record)
    }

    /// Expires the seat's hold if it has lapsed.
    ///
    /// Returns `true` if this call committed the expiry.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::SeatNotFound`] for unknown seats, or
    /// [`InventoryError::Conflict`] if the expiry kept losing races.
    pub async fn expire(&self, seat_id: SeatId) -> Result<bool, InventoryError> {
        let (_, lapsed) = self.transition(seat_id, "expire", |_, _| Ok(None)).await?;
        Ok(lapsed)
    }

    /// Expires every lapsed hold in the store. Returns how many this call
    /// released.
    pub async fn expire_due(&self) -> usize {
        let now = self.clock.now();
        let mut released = 0;
        for record in self.store.held_seats().await {
            if !record.seat.lease_lapsed(now) {
                continue;
            }
            match self.expire(record.seat.id).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(seat_id = %record.seat.id, error = %err, "sweep failed to expire hold");
                }
            }
        }
        released
    }

    /// Runs one guarded read-modify-write on a seat.
    ///
    /// A lapsed hold is always expired first, as its own commit, before
    /// `decide` sees the seat. `decide` returns `Ok(Some(next))` to write,
    /// `Ok(None)` to leave the seat as is, or an error to reject.
    ///
    /// Returns the final record and whether this call committed a lapse.
    async fn transition<F>(
        &self,
        seat_id: SeatId,
        op: &'static str,
        mut decide: F,
    ) -> Result<(VersionedSeat, bool), InventoryError>
    where
        F: FnMut(&Seat, DateTime<Utc>) -> Result<Option<Seat>, InventoryError>,
    {
        let mut races: u32 = 0;
        let mut lapsed = false;

        loop {
            let current = self.store.get(seat_id).await?;
            let now = self.clock.now();

            let (next, lapsing) = match self.leases.lapse(&current.seat, now) {
                Some(freed) => (freed, true),
                None => match decide(&current.seat, now)? {
                    Some(next) => (next, false),
                    None => return Ok((current, lapsed)),
                },
            };

            match self
                .store
                .compare_and_swap(seat_id, current.version, next)
                .await
            {
                Ok(committed) if lapsing => {
                    lapsed = true;
                    tracing::info!(
                        %seat_id,
                        event_id = %committed.seat.event_id,
                        version = committed.version,
                        "hold lapsed"
                    );
                }
                Ok(committed) => return Ok((committed, lapsed)),
                Err(InventoryError::VersionConflict {
                    expected, actual, ..
                }) => {
                    races = races.saturating_add(1);
                    if races > self.max_retries {
                        tracing::warn!(%seat_id, op, races, "version races exhausted retries");
                        return Err(InventoryError::Conflict(format!(
                            "seat {seat_id} is being modified concurrently"
                        )));
                    }
                    tracing::debug!(%seat_id, op, expected, actual, "version race; re-reading");
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{CommitFeed, ManualClock, SeatStatus};
    use chrono::TimeDelta;

    struct Fixture {
        authority: Arc<TransitionAuthority>,
        clock: ManualClock,
        seat_id: SeatId,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::default();
        let store = Arc::new(SeatStore::new(CommitFeed::new(1000), Arc::new(clock.clone())));
        let Ok(ids) = store.seed_grid(EventId::new(1), 1, 10).await else {
            panic!("seed failed");
        };
        let Some(seat_id) = ids.first().copied() else {
            panic!("no seats");
        };
        let Ok(leases) = LeaseManager::new(Duration::from_secs(300), Duration::from_secs(900))
        else {
            panic!("valid policy");
        };
        let authority = Arc::new(TransitionAuthority::new(
            store,
            leases,
            Arc::new(clock.clone()),
            8,
        ));
        Fixture {
            authority,
            clock,
            seat_id,
        }
    }

    #[tokio::test]
    async fn hold_then_finalize_sells_seat() {
        let f = fixture().await;
        let token = HoldToken::new();

        let Ok(grant) = f.authority.hold(f.seat_id, token, Duration::from_secs(60)).await else {
            panic!("hold failed");
        };
        assert_eq!(grant.expires_at, f.clock.now() + TimeDelta::seconds(60));

        let Ok(sold) = f.authority.finalize(f.seat_id, token).await else {
            panic!("finalize failed");
        };
        assert_eq!(sold.seat.status(), SeatStatus::Sold);
        assert!(sold.seat.hold_token().is_none());
    }

    #[tokio::test]
    async fn second_hold_conflicts_even_for_same_token() {
        let f = fixture().await;
        let token = HoldToken::new();
        let _ = f.authority.hold(f.seat_id, token, Duration::from_secs(60)).await;

        let again = f.authority.hold(f.seat_id, token, Duration::from_secs(60)).await;
        assert!(matches!(again, Err(InventoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn hold_rejects_bad_durations() {
        let f = fixture().await;
        for duration in [Duration::ZERO, Duration::from_secs(901)] {
            let result = f.authority.hold(f.seat_id, HoldToken::new(), duration).await;
            assert!(matches!(result, Err(InventoryError::InvalidArgument(_))));
        }
    }

    #[tokio::test]
    async fn unknown_seat_is_not_found() {
        let f = fixture().await;
        let result = f
            .authority
            .hold(SeatId::new(999), HoldToken::new(), Duration::from_secs(5))
            .await;
        assert_eq!(result, Err(InventoryError::SeatNotFound(SeatId::new(999))));
    }

    #[tokio::test]
    async fn finalize_by_other_token_conflicts() {
        let f = fixture().await;
        let _ = f
            .authority
            .hold(f.seat_id, HoldToken::new(), Duration::from_secs(60))
            .await;

        let result = f.authority.finalize(f.seat_id, HoldToken::new()).await;
        assert!(matches!(result, Err(InventoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn finalize_on_available_or_sold_conflicts() {
        let f = fixture().await;
        let token = HoldToken::new();
        assert!(matches!(
            f.authority.finalize(f.seat_id, token).await,
            Err(InventoryError::Conflict(_))
        ));

        let _ = f.authority.hold(f.seat_id, token, Duration::from_secs(60)).await;
        let _ = f.authority.finalize(f.seat_id, token).await;
        assert!(matches!(
            f.authority.finalize(f.seat_id, token).await,
            Err(InventoryError::Conflict(_))
        ));
        assert!(matches!(
            f.authority
                .hold(f.seat_id, HoldToken::new(), Duration::from_secs(60))
                .await,
            Err(InventoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn hold_is_never_released_early() {
        let f = fixture().await;
        let _ = f
            .authority
            .hold(f.seat_id, HoldToken::new(), Duration::from_secs(10))
            .await;

        f.clock.advance(TimeDelta::milliseconds(9_999));
        let Ok(record) = f.authority.get(f.seat_id).await else {
            panic!("read failed");
        };
        assert_eq!(record.seat.status(), SeatStatus::Held);

        f.clock.advance(TimeDelta::milliseconds(1));
        let Ok(record) = f.authority.get(f.seat_id).await else {
            panic!("read failed");
        };
        assert_eq!(record.seat.status(), SeatStatus::Available);
    }

    #[tokio::test]
    async fn expired_hold_can_be_taken_by_another_token() {
        let f = fixture().await;
        let a = HoldToken::new();
        let b = HoldToken::new();
        let _ = f.authority.hold(f.seat_id, a, Duration::from_secs(1)).await;

        f.clock.advance(TimeDelta::seconds(2));
        let Ok(grant) = f.authority.hold(f.seat_id, b, Duration::from_secs(60)).await else {
            panic!("re-hold failed");
        };
        assert_eq!(grant.token, b);

        let Ok(record) = f.authority.get(f.seat_id).await else {
            panic!("read failed");
        };
        assert_eq!(record.seat.hold_token(), Some(b));
    }

    #[tokio::test]
    async fn finalize_after_lapse_conflicts() {
        let f = fixture().await;
        let a = HoldToken::new();
        let _ = f.authority.hold(f.seat_id, a, Duration::from_secs(1)).await;

        f.clock.advance(TimeDelta::seconds(2));
        let result = f.authority.finalize(f.seat_id, a).await;
        assert!(matches!(result, Err(InventoryError::Conflict(_))));

        let Ok(record) = f.authority.get(f.seat_id).await else {
            panic!("read failed");
        };
        assert_eq!(record.seat.status(), SeatStatus::Available);
    }

    #[tokio::test]
    async fn re_hold_after_lapse_commits_expiry_first() {
        let f = fixture().await;
        let mut rx = f.authority.store().commits().subscribe();
        let _ = f
            .authority
            .hold(f.seat_id, HoldToken::new(), Duration::from_secs(1))
            .await;
        f.clock.advance(TimeDelta::seconds(2));
        let _ = f
            .authority
            .hold(f.seat_id, HoldToken::new(), Duration::from_secs(1))
            .await;

        let mut statuses = Vec::new();
        while let Ok(change) = rx.try_recv() {
            statuses.push(change.record.seat.status());
        }
        assert_eq!(
            statuses,
            vec![SeatStatus::Held, SeatStatus::Available, SeatStatus::Held]
        );
    }

    #[tokio::test]
    async fn concurrent_holds_have_exactly_one_winner() {
        let f = fixture().await;
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let authority = Arc::clone(&f.authority);
            let seat_id = f.seat_id;
            tasks.push(tokio::spawn(async move {
                authority
                    .hold(seat_id, HoldToken::new(), Duration::from_secs(60))
                    .await
            }));
        }

        let mut winners = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await {
                Ok(Ok(_)) => winners += 1,
                Ok(Err(InventoryError::Conflict(_))) => conflicts += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 31);
    }

    #[tokio::test]
    async fn expire_due_sweeps_untouched_seats() {
        let f = fixture().await;
        let Ok(seats) = f.authority.list_by_event(EventId::new(1)).await else {
            panic!("list failed");
        };
        for record in seats.iter().take(3) {
            let _ = f
                .authority
                .hold(record.seat.id, HoldToken::new(), Duration::from_secs(5))
                .await;
        }

        assert_eq!(f.authority.expire_due().await, 0);
        f.clock.advance(TimeDelta::seconds(5));
        assert_eq!(f.authority.expire_due().await, 3);
        assert!(f.authority.store().held_seats().await.is_empty());
    }

    #[tokio::test]
    async fn listing_expires_lapsed_holds() {
        let f = fixture().await;
        let _ = f
            .authority
            .hold(f.seat_id, HoldToken::new(), Duration::from_secs(1))
            .await;
        f.clock.advance(TimeDelta::seconds(1));

        let Ok(seats) = f.authority.list_by_event(EventId::new(1)).await else {
            panic!("list failed");
        };
        assert!(
            seats
                .iter()
                .all(|record| record.seat.status() == SeatStatus::Available)
        );
    }
}
