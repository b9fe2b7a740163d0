//! Domain layer: seat records, identifiers, storage and the commit feed.
//!
//! This module contains the server-side domain model: typed identifiers,
//! the seat record and its status, the version-tagged seat store, the
//! broadcast bus carrying committed changes, and the injectable clock.

pub mod clock;
pub mod commit_feed;
pub mod ids;
pub mod seat;
pub mod seat_change;
pub mod seat_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commit_feed::CommitFeed;
pub use ids::{EventId, HoldToken, SeatId};
pub use seat::{Seat, SeatState, SeatStatus, VersionedSeat};
pub use seat_change::{ChangeCause, SeatChange};
pub use seat_store::SeatStore;
