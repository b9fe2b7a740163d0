//! Data Transfer Objects for REST request/response serialization.
//!
//! Wire names are camelCase. Hold tokens and expiries only appear in the
//! reservation acknowledgment sent to the holder.

pub mod seat_dto;

pub use seat_dto::*;
