//! Hold leases: duration policy, grant, lapse, and the expiry sweeper.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::TransitionAuthority;
use crate::domain::{HoldToken, Seat, SeatState};
use crate::error::InventoryError;

/// Grants and expires temporary holds.
///
/// This is the only place that builds a [`SeatState::Held`] record, and
/// the only place that decides a hold has lapsed.
#[derive(Debug, Clone, Copy)]
pub struct LeaseManager {
    default_duration: Duration,
    max_duration: Duration,
}

impl LeaseManager {
    /// Creates a lease policy.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if either duration is
    /// zero or the default exceeds the maximum.
    pub fn new(default_duration: Duration, max_duration: Duration) -> Result<Self, InventoryError> {
        if default_duration.is_zero() || max_duration.is_zero() {
            return Err(InventoryError::InvalidArgument(
                "hold durations must be positive".to_string(),
            ));
        }
        if default_duration > max_duration {
            return Err(InventoryError::InvalidArgument(format!(
                "default hold {}s exceeds maximum {}s",
                default_duration.as_secs(),
                max_duration.as_secs()
            )));
        }
        Ok(Self {
            default_duration,
            max_duration,
        })
    }

    /// Hold duration used when the caller does not ask for one.
    #[must_use]
    pub const fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Longest hold a caller may ask for.
    #[must_use]
    pub const fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Resolves a requested duration in whole seconds.
    ///
    /// `None` selects the default.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] for zero, negative or
    /// over-long requests.
    pub fn duration_from_secs(&self, secs: Option<i64>) -> Result<Duration, InventoryError> {
        let Some(secs) = secs else {
            return Ok(self.default_duration);
        };
        let Ok(secs) = u64::try_from(secs) else {
            return Err(InventoryError::InvalidArgument(format!(
                "duration must be positive, got {secs}"
            )));
        };
        let duration = Duration::from_secs(secs);
        self.validate(duration)?;
        Ok(duration)
    }

    /// Checks a duration against the policy and converts it for clock
    /// arithmetic.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if `duration` is zero or
    /// above the maximum.
    pub fn validate(&self, duration: Duration) -> Result<TimeDelta, InventoryError> {
        if duration.is_zero() {
            return Err(InventoryError::InvalidArgument(
                "duration must be positive, got 0".to_string(),
            ));
        }
        if duration > self.max_duration {
            return Err(InventoryError::InvalidArgument(format!(
                "duration {}s exceeds maximum {}s",
                duration.as_secs(),
                self.max_duration.as_secs()
            )));
        }
        TimeDelta::from_std(duration)
            .map_err(|e| InventoryError::InvalidArgument(format!("duration out of range: {e}")))
    }

    /// Builds the held record for `seat`, leased to `token` from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if `duration` fails
    /// [`LeaseManager::validate`].
    pub fn grant(
        &self,
        seat: &Seat,
        token: HoldToken,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Seat, InventoryError> {
        let delta = self.validate(duration)?;
        let expires_at = now
            .checked_add_signed(delta)
            .ok_or_else(|| InventoryError::InvalidArgument("hold expiry overflows".to_string()))?;
        Ok(seat.with_state(SeatState::Held { token, expires_at }))
    }

    /// Returns the freed record if `seat` is held and its lease has lapsed
    /// at `now`.
    #[must_use]
    pub fn lapse(&self, seat: &Seat, now: DateTime<Utc>) -> Option<Seat> {
        seat.lease_lapsed(now)
            .then(|| seat.with_state(SeatState::Available))
    }
}

impl Default for LeaseManager {
    /// Five-minute holds, at most fifteen.
    fn default() -> Self {
        Self {
            default_duration: Duration::from_secs(300),
            max_duration: Duration::from_secs(900),
        }
    }
}

/// Spawns the periodic expiry sweep.
///
/// Every `interval` the sweeper asks the authority to expire all lapsed
/// holds, so idle viewers still hear about freed seats. Stops when
/// `shutdown` flips or its sender is dropped.
pub fn spawn_sweeper(
    authority: Arc<TransitionAuthority>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = authority.expire_due().await;
                    if expired > 0 {
                        tracing::info!(expired, "sweep released lapsed holds");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("expiry sweeper stopped");
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EventId, SeatId, SeatStatus};

    fn policy() -> LeaseManager {
        let Ok(leases) = LeaseManager::new(Duration::from_secs(300), Duration::from_secs(900)) else {
            panic!("valid policy");
        };
        leases
    }

    #[test]
    fn rejects_inconsistent_policy() {
        assert!(LeaseManager::new(Duration::ZERO, Duration::from_secs(1)).is_err());
        assert!(LeaseManager::new(Duration::from_secs(10), Duration::from_secs(5)).is_err());
    }

    #[test]
    fn missing_duration_uses_default() {
        assert_eq!(
            policy().duration_from_secs(None),
            Ok(Duration::from_secs(300))
        );
    }

    #[test]
    fn non_positive_and_over_long_durations_are_invalid() {
        let leases = policy();
        for secs in [0, -5, 901] {
            assert!(matches!(
                leases.duration_from_secs(Some(secs)),
                Err(InventoryError::InvalidArgument(_))
            ));
        }
        assert_eq!(
            leases.duration_from_secs(Some(900)),
            Ok(Duration::from_secs(900))
        );
    }

    #[test]
    fn grant_sets_future_expiry() {
        let seat = Seat::new(SeatId::new(1), EventId::new(1), 1, 1);
        let now = Utc::now();
        let token = HoldToken::new();
        let Ok(held) = policy().grant(&seat, token, Duration::from_secs(60), now) else {
            panic!("grant failed");
        };
        assert_eq!(held.status(), SeatStatus::Held);
        assert_eq!(held.hold_token(), Some(token));
        assert_eq!(held.hold_expires_at(), Some(now + TimeDelta::seconds(60)));
    }

    #[test]
    fn lapse_only_after_expiry() {
        let leases = policy();
        let now = Utc::now();
        let seat = Seat::new(SeatId::new(1), EventId::new(1), 1, 1);
        let Ok(held) = leases.grant(&seat, HoldToken::new(), Duration::from_secs(1), now) else {
            panic!("grant failed");
        };
        assert!(leases.lapse(&held, now).is_none());
        assert!(leases.lapse(&held, now + TimeDelta::milliseconds(999)).is_none());

        let Some(freed) = leases.lapse(&held, now + TimeDelta::seconds(1)) else {
            panic!("lease should lapse at expiry");
        };
        assert_eq!(freed.status(), SeatStatus::Available);
        assert!(leases.lapse(&seat, now).is_none());
    }
}
