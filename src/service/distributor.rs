//! Change distributor: snapshots on demand, live deltas on subscription.
//!
//! A single fan-out task reads the store's commit feed and pushes each
//! change into a bounded queue per subscriber of that event. A subscriber
//! whose queue is full is disconnected; it learns about it on its next
//! read and must resubscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use futures_util::Stream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::TransitionAuthority;
use crate::domain::{EventId, SeatChange, SeatId, VersionedSeat};
use crate::error::InventoryError;

/// One message on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Full ordered seat list of the event. Always the first message.
    Snapshot {
        /// Event the seats belong to.
        event_id: EventId,
        /// Seats ordered by row, then number.
        seats: Vec<VersionedSeat>,
    },
    /// One committed change newer than everything delivered before it.
    Delta(SeatChange),
}

#[derive(Debug)]
struct Slot {
    id: u64,
    tx: mpsc::Sender<SeatChange>,
    severed: Arc<AtomicBool>,
}

impl Slot {
    fn sever(&self) {
        self.severed.store(true, Ordering::Release);
    }
}

/// Per-event subscriber slots, shared with every [`Subscription`] so a
/// closed subscription can take its slot out immediately.
#[derive(Debug, Default)]
struct SlotTable {
    events: std::sync::Mutex<HashMap<EventId, Vec<Slot>>>,
}

impl SlotTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<EventId, Vec<Slot>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, event_id: EventId, id: u64) {
        let mut events = self.lock();
        if let Some(subscribers) = events.get_mut(&event_id) {
            subscribers.retain(|slot| slot.id != id);
            if subscribers.is_empty() {
                events.remove(&event_id);
            }
        }
    }
}

/// Fans committed changes out to per-event subscribers.
#[derive(Debug)]
pub struct ChangeDistributor {
    authority: Arc<TransitionAuthority>,
    slots: Arc<SlotTable>,
    queue_depth: usize,
    next_id: AtomicU64,
}

impl ChangeDistributor {
    /// Creates a distributor whose subscribers buffer at most
    /// `queue_depth` undelivered changes.
    #[must_use]
    pub fn new(authority: Arc<TransitionAuthority>, queue_depth: usize) -> Self {
        Self {
            authority,
            slots: Arc::new(SlotTable::default()),
            queue_depth: queue_depth.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the full ordered seat list of an event.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::EventNotFound`] for unknown events.
    pub async fn snapshot(&self, event_id: EventId) -> Result<Vec<VersionedSeat>, InventoryError> {
        self.authority.list_by_event(event_id).await
    }

    /// Opens a live subscription to an event.
    ///
    /// The subscriber is registered before the snapshot is read, so no
    /// commit can fall between the two; deltas the snapshot already
    /// reflects are suppressed.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::EventNotFound`] for unknown events.
    pub async fn subscribe(&self, event_id: EventId) -> Result<Subscription, InventoryError> {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let severed = Arc::new(AtomicBool::new(false));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.slots
            .lock()
            .entry(event_id)
            .or_default()
            .push(Slot {
                id,
                tx,
                severed: Arc::clone(&severed),
            });

        let seats = match self.authority.list_by_event(event_id).await {
            Ok(seats) => seats,
            Err(err) => {
                self.slots.remove(event_id, id);
                return Err(err);
            }
        };

        tracing::debug!(subscriber = id, %event_id, seats = seats.len(), "subscriber joined");
        Ok(Subscription::new(
            id,
            event_id,
            seats,
            rx,
            severed,
            Arc::clone(&self.slots),
        ))
    }

    /// Returns how many subscribers an event currently has.
    pub async fn subscriber_count(&self, event_id: EventId) -> usize {
        self.slots
            .lock()
            .get(&event_id)
            .map_or(0, Vec::len)
    }

    /// Queues `change` for every subscriber of its event.
    ///
    /// Subscribers whose queue is full are severed and dropped; closed
    /// ones are dropped silently.
    pub async fn deliver(&self, change: SeatChange) {
        let event_id = change.event_id();
        let mut slots = self.slots.lock();
        let Some(subscribers) = slots.get_mut(&event_id) else {
            return;
        };

        subscribers.retain(|slot| match slot.tx.try_send(change.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                slot.sever();
                tracing::warn!(
                    subscriber = slot.id,
                    %event_id,
                    depth = self.queue_depth,
                    "subscriber queue full; disconnecting"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = slot.id, %event_id, "subscriber left");
                false
            }
        });

        if subscribers.is_empty() {
            slots.remove(&event_id);
        }
    }

    /// Severs every subscriber. Each must resynchronise.
    pub async fn disconnect_all(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.values().flatten() {
            slot.sever();
        }
        slots.clear();
    }

    /// Starts the fan-out task.
    ///
    /// `commits` must be subscribed to the store's feed before any write
    /// that subscribers should see. If the task falls behind the feed,
    /// every subscriber is severed, since each of them missed changes.
    pub fn spawn(
        self: &Arc<Self>,
        mut commits: broadcast::Receiver<SeatChange>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let distributor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = commits.recv() => match change {
                        Ok(change) => distributor.deliver(change).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(lagged = n, "fan-out lagged behind commit feed; disconnecting subscribers");
                            distributor.disconnect_all().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
            distributor.disconnect_all().await;
            tracing::debug!("change fan-out stopped");
        })
    }
}

/// A live feed of one event's seat changes.
///
/// Yields a snapshot first, then deltas in commit order. It never ends on
/// its own: it is closed by dropping it or calling
/// [`Subscription::cancel`], which discards its queue at the distributor,
/// or severed by the distributor, after which every read returns
/// [`InventoryError::TransportInterrupted`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    event_id: EventId,
    pending: Option<Vec<VersionedSeat>>,
    seen: HashMap<SeatId, u64>,
    rx: mpsc::Receiver<SeatChange>,
    severed: Arc<AtomicBool>,
    slots: Arc<SlotTable>,
}

impl Subscription {
    fn new(
        id: u64,
        event_id: EventId,
        seats: Vec<VersionedSeat>,
        rx: mpsc::Receiver<SeatChange>,
        severed: Arc<AtomicBool>,
        slots: Arc<SlotTable>,
    ) -> Self {
        let seen = seats
            .iter()
            .map(|record| (record.seat.id, record.version))
            .collect();
        Self {
            id,
            event_id,
            pending: Some(seats),
            seen,
            rx,
            severed,
            slots,
        }
    }

    /// Subscriber identifier, unique per distributor.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Event this subscription follows.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Waits for the next notification.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransportInterrupted`] once the
    /// distributor has severed or dropped this subscriber.
    pub async fn next(&mut self) -> Result<Notification, InventoryError> {
        if let Some(seats) = self.pending.take() {
            return Ok(Notification::Snapshot {
                event_id: self.event_id,
                seats,
            });
        }

        loop {
            if self.severed.load(Ordering::Acquire) {
                self.rx.close();
                return Err(InventoryError::TransportInterrupted(format!(
                    "subscription {} to event {} fell behind",
                    self.id, self.event_id
                )));
            }

            let Some(change) = self.rx.recv().await else {
                return Err(InventoryError::TransportInterrupted(format!(
                    "subscription {} to event {} was closed",
                    self.id, self.event_id
                )));
            };

            let seen = self.seen.entry(change.seat_id()).or_insert(0);
            if change.version() <= *seen {
                continue;
            }
            *seen = change.version();
            return Ok(Notification::Delta(change));
        }
    }

    /// Turns the subscription into a stream that ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Notification, InventoryError>> + Send {
        async_stream::stream! {
            let mut subscription = self;
            loop {
                let item = subscription.next().await;
                let done = item.is_err();
                yield item;
                if done {
                    break;
                }
            }
        }
    }

    /// Closes the subscription.
    pub fn cancel(self) {
        tracing::debug!(subscriber = self.id, event_id = %self.event_id, "subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.slots.remove(self.event_id, self.id);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::TimeDelta;

    use crate::domain::{CommitFeed, HoldToken, ManualClock, SeatStatus, SeatStore};
    use crate::service::LeaseManager;

    struct Fixture {
        authority: Arc<TransitionAuthority>,
        distributor: Arc<ChangeDistributor>,
        clock: ManualClock,
        seats: Vec<SeatId>,
        shutdown: watch::Sender<bool>,
    }

    async fn fixture(queue_depth: usize) -> Fixture {
        let clock = ManualClock::default();
        let store = Arc::new(SeatStore::new(CommitFeed::new(1000), Arc::new(clock.clone())));
        let commits = store.commits().subscribe();
        let Ok(seats) = store.seed_grid(EventId::new(1), 2, 5).await else {
            panic!("seed failed");
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
        let distributor = Arc::new(ChangeDistributor::new(Arc::clone(&authority), queue_depth));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let _ = distributor.spawn(commits, shutdown_rx);
        Fixture {
            authority,
            distributor,
            clock,
            seats,
            shutdown,
        }
    }

    async fn next_within(sub: &mut Subscription) -> Result<Notification, InventoryError> {
        match tokio::time::timeout(Duration::from_secs(2), sub.next()).await {
            Ok(result) => result,
            Err(_) => panic!("timed out waiting for notification"),
        }
    }

    fn seat(f: &Fixture, index: usize) -> SeatId {
        let Some(id) = f.seats.get(index).copied() else {
            panic!("no seat at {index}");
        };
        id
    }

    #[tokio::test]
    async fn first_message_is_ordered_snapshot() {
        let f = fixture(16).await;
        let Ok(mut sub) = f.distributor.subscribe(EventId::new(1)).await else {
            panic!("subscribe failed");
        };

        let Ok(Notification::Snapshot { seats, .. }) = next_within(&mut sub).await else {
            panic!("expected snapshot first");
        };
        let order: Vec<(i32, i32)> = seats.iter().map(|r| r.seat.position()).collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);
        assert_eq!(seats.len(), 10);
    }

    #[tokio::test]
    async fn unknown_event_cannot_be_subscribed() {
        let f = fixture(16).await;
        let result = f.distributor.subscribe(EventId::new(404)).await;
        assert!(matches!(result, Err(InventoryError::EventNotFound(_))));
        assert_eq!(f.distributor.subscriber_count(EventId::new(404)).await, 0);
    }

    #[tokio::test]
    async fn commits_arrive_as_deltas_in_order() {
        let f = fixture(16).await;
        let Ok(mut sub) = f.distributor.subscribe(EventId::new(1)).await else {
            panic!("subscribe failed");
        };
        let _ = next_within(&mut sub).await;

        let token = HoldToken::new();
        let target = seat(&f, 3);
        let _ = f.authority.hold(target, token, Duration::from_secs(60)).await;
        let _ = f.authority.finalize(target, token).await;

        let mut statuses = Vec::new();
        for _ in 0..2 {
            let Ok(Notification::Delta(change)) = next_within(&mut sub).await else {
                panic!("expected delta");
            };
            assert_eq!(change.seat_id(), target);
            statuses.push(change.record.seat.status());
        }
        assert_eq!(statuses, vec![SeatStatus::Held, SeatStatus::Sold]);
    }

    #[tokio::test]
    async fn sweep_notifies_idle_subscribers() {
        let f = fixture(16).await;
        let target = seat(&f, 0);
        let _ = f
            .authority
            .hold(target, HoldToken::new(), Duration::from_secs(1))
            .await;

        let Ok(mut sub) = f.distributor.subscribe(EventId::new(1)).await else {
            panic!("subscribe failed");
        };
        let _ = next_within(&mut sub).await;

        f.clock.advance(TimeDelta::seconds(1));
        assert_eq!(f.authority.expire_due().await, 1);

        let Ok(Notification::Delta(change)) = next_within(&mut sub).await else {
            panic!("expected delta");
        };
        assert_eq!(change.seat_id(), target);
        assert_eq!(change.record.seat.status(), SeatStatus::Available);
    }

    #[tokio::test]
    async fn other_events_are_not_delivered() {
        let f = fixture(16).await;
        let _ = f.authority.store().seed_grid(EventId::new(2), 1, 1).await;
        let Ok(mut sub) = f.distributor.subscribe(EventId::new(2)).await else {
            panic!("subscribe failed");
        };
        let _ = next_within(&mut sub).await;

        let _ = f
            .authority
            .hold(seat(&f, 0), HoldToken::new(), Duration::from_secs(60))
            .await;

        let waited = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn full_queue_severs_subscriber() {
        let f = fixture(1).await;
        let Ok(mut sub) = f.distributor.subscribe(EventId::new(1)).await else {
            panic!("subscribe failed");
        };
        let _ = next_within(&mut sub).await;

        for index in 0..3 {
            let _ = f
                .authority
                .hold(seat(&f, index), HoldToken::new(), Duration::from_secs(60))
                .await;
        }

        let mut interrupted = false;
        for _ in 0..3 {
            if let Err(InventoryError::TransportInterrupted(_)) = next_within(&mut sub).await {
                interrupted = true;
                break;
            }
        }
        assert!(interrupted);
        assert!(matches!(
            next_within(&mut sub).await,
            Err(InventoryError::TransportInterrupted(_))
        ));
    }

    #[tokio::test]
    async fn closing_a_subscription_discards_its_slot() {
        let f = fixture(16).await;
        let event = EventId::new(1);
        for _ in 0..100 {
            let Ok(sub) = f.distributor.subscribe(event).await else {
                panic!("subscribe failed");
            };
            sub.cancel();
        }
        assert_eq!(f.distributor.subscriber_count(event).await, 0);

        let Ok(kept) = f.distributor.subscribe(event).await else {
            panic!("subscribe failed");
        };
        let Ok(dropped) = f.distributor.subscribe(event).await else {
            panic!("subscribe failed");
        };
        assert_eq!(f.distributor.subscriber_count(event).await, 2);
        drop(dropped);
        assert_eq!(f.distributor.subscriber_count(event).await, 1);

        let stream = kept.into_stream();
        drop(stream);
        assert_eq!(f.distributor.subscriber_count(event).await, 0);
    }

    #[tokio::test]
    async fn shutdown_interrupts_subscribers() {
        let f = fixture(16).await;
        let Ok(mut sub) = f.distributor.subscribe(EventId::new(1)).await else {
            panic!("subscribe failed");
        };
        let _ = next_within(&mut sub).await;

        let _ = f.shutdown.send(true);
        assert!(matches!(
            next_within(&mut sub).await,
            Err(InventoryError::TransportInterrupted(_))
        ));
    }
}
