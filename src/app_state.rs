//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::InventoryConfig;
use crate::domain::{Clock, CommitFeed, SeatStore};
use crate::error::InventoryError;
use crate::service::{ChangeDistributor, LeaseManager, TransitionAuthority, spawn_sweeper};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Sole mutator of seat state.
    pub authority: Arc<TransitionAuthority>,
    /// Snapshots and live subscriptions.
    pub distributor: Arc<ChangeDistributor>,
    /// Hold duration policy.
    pub leases: LeaseManager,
    /// Period of SSE keep-alive comments.
    pub sse_keepalive: Duration,
}

/// Handles of the background tasks started by [`AppState::bootstrap`].
#[derive(Debug)]
pub struct Background {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Background {
    /// Signals every task to stop and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "background task ended abnormally");
            }
        }
        tracing::info!("background tasks stopped");
    }
}

impl AppState {
    /// Builds the store, authority and distributor, seeds the demo
    /// inventory, and starts the fan-out and sweep tasks.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if the seed layout is
    /// invalid.
    pub async fn bootstrap(
        config: &InventoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, Background), InventoryError> {
        let store = Arc::new(SeatStore::new(
            CommitFeed::new(config.commit_feed_capacity),
            Arc::clone(&clock),
        ));
        let commits = store.commits().subscribe();

        if let Some(seed) = config.seed {
            let seats = store
                .seed_grid(seed.event_id, seed.rows, seed.seats_per_row)
                .await?;
            tracing::info!(event_id = %seed.event_id, seats = seats.len(), "seeded demo inventory");
        }

        let authority = Arc::new(TransitionAuthority::new(
            store,
            config.leases,
            clock,
            config.cas_max_retries,
        ));
        let distributor = Arc::new(ChangeDistributor::new(
            Arc::clone(&authority),
            config.subscriber_queue_depth,
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handles = vec![
            distributor.spawn(commits, shutdown_rx.clone()),
            spawn_sweeper(Arc::clone(&authority), config.sweep_interval, shutdown_rx),
        ];

        let state = Self {
            authority,
            distributor,
            leases: config.leases,
            sse_keepalive: config.sse_keepalive,
        };
        Ok((state, Background { shutdown, handles }))
    }
}
