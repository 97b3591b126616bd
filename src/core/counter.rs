//! Interrupt-safe pulse counter.
//!
//! `on_edge` is the only code that runs concurrently with the main loop. It is
//! a single atomic increment and never blocks, allocates, or logs. `drain` is a
//! single atomic swap, so an edge landing at any point during a drain is
//! either part of the returned value or part of the next window.

use std::sync::atomic::{AtomicU32, Ordering};

/// Pulses observed since the last drain.
pub type PulseCount = u32;

/// Accumulates pulse edges between drains.
#[derive(Debug, Default)]
pub struct PulseCounter {
    count: AtomicU32,
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Record one qualifying edge. Wraps at `u32::MAX`.
    #[inline]
    pub fn on_edge(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Read the current count and reset it to zero in one indivisible step.
    pub fn drain(&self) -> PulseCount {
        self.count.swap(0, Ordering::AcqRel)
    }

    /// Current count without resetting it.
    pub fn pending(&self) -> PulseCount {
        self.count.load(Ordering::Acquire)
    }
}
