//! Keeps a [`SeatReconciler`] in step with a seat feed.
//!
//! The loop prefers the live subscription. When subscribing fails it falls
//! back to re-reading snapshots every `resync_interval` until the feed
//! comes back, and gives up only after `max_resync_failures` snapshot
//! reads in a row have failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};

use super::SeatReconciler;
use crate::domain::{EventId, VersionedSeat};
use crate::error::InventoryError;
use crate::service::{ChangeDistributor, Subscription};

/// Source of snapshots and live subscriptions for one viewer.
pub trait SeatFeed: Send + Sync {
    /// Reads the full ordered seat list of an event.
    fn snapshot(
        &self,
        event_id: EventId,
    ) -> impl Future<Output = Result<Vec<VersionedSeat>, InventoryError>> + Send;

    /// Opens a live subscription to an event.
    fn subscribe(
        &self,
        event_id: EventId,
    ) -> impl Future<Output = Result<Subscription, InventoryError>> + Send;
}

impl SeatFeed for ChangeDistributor {
    async fn snapshot(&self, event_id: EventId) -> Result<Vec<VersionedSeat>, InventoryError> {
        Self::snapshot(self, event_id).await
    }

    async fn subscribe(&self, event_id: EventId) -> Result<Subscription, InventoryError> {
        Self::subscribe(self, event_id).await
    }
}

/// Retry policy of [`ViewerSync`].
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    /// Pause between snapshot reads while the subscription is down.
    pub resync_interval: Duration,
    /// Consecutive failed snapshot reads tolerated before giving up.
    pub max_resync_failures: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(2),
            max_resync_failures: 5,
        }
    }
}

/// Drives one viewer's local seat list.
#[derive(Debug)]
pub struct ViewerSync<F> {
    feed: Arc<F>,
    event_id: EventId,
    view: Arc<RwLock<SeatReconciler>>,
    policy: SyncPolicy,
}

impl<F: SeatFeed> ViewerSync<F> {
    /// Creates a sync loop for `event_id` with an empty view.
    #[must_use]
    pub fn new(feed: Arc<F>, event_id: EventId, policy: SyncPolicy) -> Self {
        Self {
            feed,
            event_id,
            view: Arc::new(RwLock::new(SeatReconciler::new())),
            policy,
        }
    }

    /// Shared handle to the local view.
    #[must_use]
    pub fn view(&self) -> Arc<RwLock<SeatReconciler>> {
        Arc::clone(&self.view)
    }

    /// Replaces the local view with a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Propagates the feed's snapshot error.
    pub async fn resync(&self) -> Result<(), InventoryError> {
        let seats = self.feed.snapshot(self.event_id).await?;
        self.view.write().await.apply_snapshot(self.event_id, seats);
        Ok(())
    }

    /// Runs until `shutdown` flips.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TransportInterrupted`] once
    /// `max_resync_failures` snapshot reads in a row have failed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), InventoryError> {
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            if let Err(err) = self.resync().await {
                failures = failures.saturating_add(1);
                tracing::warn!(event_id = %self.event_id, failures, error = %err, "resync failed");
                if failures >= self.policy.max_resync_failures {
                    return Err(InventoryError::TransportInterrupted(format!(
                        "could not resynchronise event {} after {failures} attempts",
                        self.event_id
                    )));
                }
                if self.pause(&mut shutdown).await {
                    return Ok(());
                }
                continue;
            }
            failures = 0;

            match self.feed.subscribe(self.event_id).await {
                Ok(subscription) => match self.follow(subscription, &mut shutdown).await {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        self.view.write().await.invalidate();
                        tracing::warn!(event_id = %self.event_id, error = %err, "live feed lost; resynchronising");
                    }
                },
                Err(err) => {
                    tracing::debug!(event_id = %self.event_id, error = %err, "live feed unavailable; polling snapshots");
                    if self.pause(&mut shutdown).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Applies notifications until shutdown (`Ok`) or interruption (`Err`).
    async fn follow(
        &self,
        mut subscription: Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), InventoryError> {
        loop {
            tokio::select! {
                notification = subscription.next() => {
                    self.view.write().await.apply(notification?)?;
                }
                _ = shutdown.changed() => {
                    subscription.cancel();
                    return Ok(());
                }
            }
        }
    }

    /// Waits one resync interval. Returns `true` if shutdown was requested.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.policy.resync_interval) => false,
            _ = shutdown.changed() => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use crate::domain::{CommitFeed, HoldToken, ManualClock, SeatId, SeatStatus, SeatStore};
    use crate::service::{LeaseManager, TransitionAuthority};

    /// Distributor wrapper whose subscribe and snapshot can be switched off.
    #[derive(Debug)]
    struct FlakyFeed {
        inner: Arc<ChangeDistributor>,
        live: AtomicBool,
        snapshots_up: AtomicBool,
        snapshot_calls: AtomicU32,
    }

    impl SeatFeed for FlakyFeed {
        async fn snapshot(&self, event_id: EventId) -> Result<Vec<VersionedSeat>, InventoryError> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            if !self.snapshots_up.load(Ordering::SeqCst) {
                return Err(InventoryError::TransportInterrupted("down".to_string()));
            }
            self.inner.snapshot(event_id).await
        }

        async fn subscribe(&self, event_id: EventId) -> Result<Subscription, InventoryError> {
            if !self.live.load(Ordering::SeqCst) {
                return Err(InventoryError::TransportInterrupted("no stream".to_string()));
            }
            self.inner.subscribe(event_id).await
        }
    }

    struct Fixture {
        authority: Arc<TransitionAuthority>,
        feed: Arc<FlakyFeed>,
        first_seat: SeatId,
        _shutdown: watch::Sender<bool>,
    }

    async fn fixture(live: bool) -> Fixture {
        let clock = ManualClock::default();
        let store = Arc::new(SeatStore::new(CommitFeed::new(1000), Arc::new(clock.clone())));
        let commits = store.commits().subscribe();
        let Ok(ids) = store.seed_grid(EventId::new(1), 1, 4).await else {
            panic!("seed failed");
        };
        let Some(first_seat) = ids.first().copied() else {
            panic!("no seats");
        };
        let Ok(leases) = LeaseManager::new(Duration::from_secs(300), Duration::from_secs(900))
        else {
            panic!("valid policy");
        };
        let authority = Arc::new(TransitionAuthority::new(store, leases, Arc::new(clock), 8));
        let distributor = Arc::new(ChangeDistributor::new(Arc::clone(&authority), 16));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let _ = distributor.spawn(commits, shutdown_rx);
        let feed = Arc::new(FlakyFeed {
            inner: distributor,
            live: AtomicBool::new(live),
            snapshots_up: AtomicBool::new(true),
            snapshot_calls: AtomicU32::new(0),
        });
        Fixture {
            authority,
            feed,
            first_seat,
            _shutdown: shutdown,
        }
    }

    fn fast_policy() -> SyncPolicy {
        SyncPolicy {
            resync_interval: Duration::from_millis(10),
            max_resync_failures: 3,
        }
    }

    async fn wait_for_status(
        view: &Arc<RwLock<SeatReconciler>>,
        seat_id: SeatId,
        status: SeatStatus,
    ) -> bool {
        for _ in 0..200 {
            if view.read().await.get(seat_id).map(|r| r.seat.status()) == Some(status) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn live_feed_converges_without_local_mutation() {
        let f = fixture(true).await;
        let sync = Arc::new(ViewerSync::new(
            Arc::clone(&f.feed),
            EventId::new(1),
            fast_policy(),
        ));
        let view = sync.view();
        let (stop, stop_rx) = watch::channel(false);
        let runner = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.run(stop_rx).await })
        };

        assert!(wait_for_status(&view, f.first_seat, SeatStatus::Available).await);
        let token = HoldToken::new();
        let _ = f
            .authority
            .hold(f.first_seat, token, Duration::from_secs(60))
            .await;
        assert!(wait_for_status(&view, f.first_seat, SeatStatus::Held).await);
        let _ = f.authority.finalize(f.first_seat, token).await;
        assert!(wait_for_status(&view, f.first_seat, SeatStatus::Sold).await);

        let _ = stop.send(true);
        let Ok(outcome) = runner.await else {
            panic!("sync task panicked");
        };
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn falls_back_to_polling_and_recovers() {
        let f = fixture(false).await;
        let sync = Arc::new(ViewerSync::new(
            Arc::clone(&f.feed),
            EventId::new(1),
            fast_policy(),
        ));
        let view = sync.view();
        let (stop, stop_rx) = watch::channel(false);
        let runner = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.run(stop_rx).await })
        };

        let _ = f
            .authority
            .hold(f.first_seat, HoldToken::new(), Duration::from_secs(60))
            .await;
        assert!(wait_for_status(&view, f.first_seat, SeatStatus::Held).await);
        assert!(f.feed.snapshot_calls.load(Ordering::SeqCst) >= 1);

        f.feed.live.store(true, Ordering::SeqCst);
        let second = SeatId::new(f.first_seat.get() + 1);
        let _ = f
            .authority
            .hold(second, HoldToken::new(), Duration::from_secs(60))
            .await;
        assert!(wait_for_status(&view, second, SeatStatus::Held).await);

        let _ = stop.send(true);
        let _ = runner.await;
    }

    #[tokio::test]
    async fn gives_up_after_repeated_resync_failures() {
        let f = fixture(false).await;
        f.feed.snapshots_up.store(false, Ordering::SeqCst);
        let sync = ViewerSync::new(Arc::clone(&f.feed), EventId::new(1), fast_policy());
        let (_stop, stop_rx) = watch::channel(false);

        let outcome = tokio::time::timeout(Duration::from_secs(2), sync.run(stop_rx)).await;
        let Ok(outcome) = outcome else {
            panic!("sync loop did not give up");
        };
        assert!(matches!(
            outcome,
            Err(InventoryError::TransportInterrupted(_))
        ));
        assert_eq!(f.feed.snapshot_calls.load(Ordering::SeqCst), 3);
    }
}
