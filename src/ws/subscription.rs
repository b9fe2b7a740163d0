//! Per-connection subscription manager.
//!
//! Holds one live feed per followed event and merges them into a single
//! stream the connection loop can poll.

use std::fmt;
use std::pin::Pin;

use futures_util::Stream;
use tokio_stream::{StreamExt, StreamMap};

use crate::domain::EventId;
use crate::error::InventoryError;
use crate::service::Notification;

type Feed = Pin<Box<dyn Stream<Item = Result<Notification, InventoryError>> + Send>>;

/// Manages the event subscriptions of a single WebSocket connection.
pub struct SubscriptionManager {
    feeds: StreamMap<EventId, Feed>,
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("event_ids", &self.event_ids())
            .finish()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            feeds: StreamMap::new(),
        }
    }

    /// Starts following `event_id` through `feed`, replacing any previous
    /// feed for it. Returns `true` if one was replaced.
    pub fn insert<S>(&mut self, event_id: EventId, feed: S) -> bool
    where
        S: Stream<Item = Result<Notification, InventoryError>> + Send + 'static,
    {
        self.feeds.insert(event_id, Box::pin(feed)).is_some()
    }

    /// Stops following `event_id`. Returns `true` if it was followed.
    pub fn remove(&mut self, event_id: EventId) -> bool {
        self.feeds.remove(&event_id).is_some()
    }

    /// Returns `true` if `event_id` is followed.
    #[must_use]
    pub fn contains(&self, event_id: EventId) -> bool {
        self.feeds.contains_key(&event_id)
    }

    /// Followed events, in ascending order.
    #[must_use]
    pub fn event_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.feeds.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of followed events.
    #[must_use]
    pub fn count(&self) -> usize {
        self.feeds.len()
    }

    /// Returns `true` if nothing is followed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Waits for the next item of any feed.
    ///
    /// Feeds that end are dropped. Returns `None` immediately when nothing
    /// is followed.
    pub async fn next(&mut self) -> Option<(EventId, Result<Notification, InventoryError>)> {
        self.feeds.next().await
    }
}
