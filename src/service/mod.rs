//! Service layer: leases, transitions and change distribution.
//!
//! [`TransitionAuthority`] applies every seat transition against the
//! [`crate::domain::SeatStore`], [`LeaseManager`] owns hold policy and the
//! expiry sweep, and [`ChangeDistributor`] fans committed changes out to
//! live subscribers.

pub mod distributor;
pub mod lease;
pub mod transition;

pub use distributor::{ChangeDistributor, Notification, Subscription};
pub use lease::{LeaseManager, spawn_sweeper};
pub use transition::{HoldGrant, TransitionAuthority};
