//! Viewer-side reconciliation.
//!
//! [`SeatReconciler`] merges a snapshot and the deltas that follow it into
//! one ordered local seat list. [`ViewerSync`] keeps it fed from any
//! [`SeatFeed`], falling back to periodic snapshots when the live feed is
//! unavailable.

pub mod reconciler;
pub mod sync;

pub use reconciler::SeatReconciler;
pub use sync::{SeatFeed, SyncPolicy, ViewerSync};
