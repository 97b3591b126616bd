//! Pulse accounting for the Geiger Sensor Agent.
//!
//! This module contains:
//! - The interrupt-safe pulse counter
//! - Fixed-period aggregation into window snapshots
//! - The wire payload built from a snapshot
//! - Clock abstractions shared by the above

pub mod clock;
pub mod counter;
pub mod payload;
pub mod window;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use counter::{PulseCount, PulseCounter};
pub use payload::{TelemetryPayload, Timestamp, TimestampMode};
pub use window::{AggregationWindow, WindowSnapshot};
