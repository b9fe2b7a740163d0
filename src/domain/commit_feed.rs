//! The store's commit feed.
//!
//! Every successful compare-and-swap is published here exactly once, in
//! per-seat version order. The change distributor is the main reader; a
//! reader that falls more than `capacity` commits behind gets
//! [`broadcast::error::RecvError::Lagged`] and must treat its view as lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::SeatChange;

/// Broadcast feed of [`SeatChange`]s with a running commit count.
///
/// Cloning is cheap; clones share the channel and the counter.
#[derive(Debug, Clone)]
pub struct CommitFeed {
    sender: broadcast::Sender<SeatChange>,
    published: Arc<AtomicU64>,
}

impl CommitFeed {
    /// Creates a feed retaining at most `capacity` unread commits per
    /// reader.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes a commit. Returns how many readers were attached.
    ///
    /// The commit is counted even when nobody is listening.
    pub fn publish(&self, change: SeatChange) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(change).unwrap_or(0)
    }

    /// Attaches a reader that sees every commit published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SeatChange> {
        self.sender.subscribe()
    }

    /// Number of attached readers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total commits published since creation.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
