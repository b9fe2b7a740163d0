//! Seat DTOs for listing, reservation and booking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{HoldToken, Seat, SeatStatus};
use crate::error::InventoryError;
use crate::service::HoldGrant;

/// Public view of a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeatDto {
    /// Seat identifier.
    pub id: i64,
    /// Event the seat belongs to.
    pub event_id: i64,
    /// Row number.
    pub row: i32,
    /// Seat number within the row.
    pub number: i32,
    /// `"available"`, `"reserved"` or `"booked"`.
    pub status: SeatStatus,
}

impl From<&Seat> for SeatDto {
    fn from(seat: &Seat) -> Self {
        Self {
            id: seat.id.get(),
            event_id: seat.event_id.get(),
            row: seat.row,
            number: seat.number,
            status: seat.status(),
        }
    }
}

/// Query parameters of `POST /seats/{seat_id}/reserve`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReserveParams {
    /// Hold duration in seconds. Defaults to the configured hold.
    pub duration: Option<String>,
    /// Caller-chosen hold token (UUID). Minted by the server when absent.
    pub token: Option<String>,
}

impl ReserveParams {
    /// Parses `duration` as whole seconds. A blank value counts as absent.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if it is not an integer.
    pub fn duration_secs(&self) -> Result<Option<i64>, InventoryError> {
        self.duration
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                raw.trim().parse::<i64>().map_err(|_| {
                    InventoryError::InvalidArgument(format!("duration must be an integer, got {raw:?}"))
                })
            })
            .transpose()
    }

    /// Parses `token`, minting a fresh one when absent.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if it is not a UUID.
    pub fn token_or_new(&self) -> Result<HoldToken, InventoryError> {
        match self.token.as_deref() {
            Some(raw) => parse_token(raw),
            None => Ok(HoldToken::new()),
        }
    }
}

/// Query parameters of `POST /seats/{seat_id}/book`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookParams {
    /// Token returned by the reservation.
    pub token: Option<String>,
}

impl BookParams {
    /// Parses the required `token`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidArgument`] if it is missing or not
    /// a UUID.
    pub fn token(&self) -> Result<HoldToken, InventoryError> {
        let raw = self
            .token
            .as_deref()
            .ok_or_else(|| InventoryError::InvalidArgument("token is required".to_string()))?;
        parse_token(raw)
    }
}

fn parse_token(raw: &str) -> Result<HoldToken, InventoryError> {
    raw.trim()
        .parse()
        .map_err(|_| InventoryError::InvalidArgument(format!("token must be a UUID, got {raw:?}")))
}

/// Response body of a successful reservation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HoldAckDto {
    /// Reserved seat.
    pub seat_id: i64,
    /// Token to present when booking.
    pub hold_token: Uuid,
    /// Instant the reservation lapses.
    pub expires_at: DateTime<Utc>,
    /// Human-readable confirmation.
    pub message: String,
}

impl From<&HoldGrant> for HoldAckDto {
    fn from(grant: &HoldGrant) -> Self {
        Self {
            seat_id: grant.seat_id.get(),
            hold_token: *grant.token.as_uuid(),
            expires_at: grant.expires_at,
            message: format!("seat {} reserved", grant.seat_id),
        }
    }
}

/// Response body of a successful booking.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookAckDto {
    /// Booked seat.
    pub seat_id: i64,
    /// Always `"booked"`.
    pub status: SeatStatus,
    /// Human-readable confirmation.
    pub message: String,
}

impl From<&Seat> for BookAckDto {
    fn from(seat: &Seat) -> Self {
        Self {
            seat_id: seat.id.get(),
            status: seat.status(),
            message: format!("seat {} booked", seat.id),
        }
    }
}
