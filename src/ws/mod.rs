//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` lets one connection follow the seat
//! maps of several events at once. Each subscription starts with a
//! snapshot event and continues with one delta event per committed change.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
