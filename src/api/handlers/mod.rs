//! REST endpoint handlers organized by resource.

pub mod seats;
pub mod stream;
pub mod system;
