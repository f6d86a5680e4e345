//! Shared utilities.

pub mod clock;
pub mod duration_ms;
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
