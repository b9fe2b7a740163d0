//! Inventory error types with HTTP status code mapping.
//!
//! [`InventoryError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::{EventId, SeatId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "conflict: seat 3 is not available",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`InventoryError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2099 | Not Found       | 404 Not Found                |
/// | 2100–2199 | State           | 409 Conflict                 |
/// | 3000–3999 | Server          | 500 / 503                    |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    /// Seat with the given ID does not exist.
    #[error("seat not found: {0}")]
    SeatNotFound(SeatId),

    /// Event with the given ID does not exist.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// A transition guard failed, or version races exhausted the retry budget.
    ///
    /// The caller must re-fetch state before retrying its intent.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The stored record changed since it was read.
    ///
    /// Only the store returns this; the transition authority absorbs it.
    #[error("version conflict on seat {seat_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Seat whose record moved.
        seat_id: SeatId,
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// Malformed input such as a non-positive hold duration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A live subscription was dropped; the reader must resynchronise.
    #[error("transport interrupted: {0}")]
    TransportInterrupted(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl InventoryError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) => 1001,
            Self::SeatNotFound(_) => 2001,
            Self::EventNotFound(_) => 2002,
            Self::Conflict(_) => 2101,
            Self::VersionConflict { .. } => 2102,
            Self::Internal(_) => 3000,
            Self::TransportInterrupted(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::SeatNotFound(_) | Self::EventNotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::VersionConflict { .. } => StatusCode::CONFLICT,
            Self::TransportInterrupted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InventoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let err = InventoryError::Conflict("seat 1 is not available".to_string());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2101);
    }

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(
            InventoryError::SeatNotFound(SeatId::new(7)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            InventoryError::EventNotFound(EventId::new(7)).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn into_response_carries_status() {
        let response = InventoryError::InvalidArgument("duration".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
