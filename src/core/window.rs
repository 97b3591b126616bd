//! Fixed-period aggregation of the pulse counter into window snapshots.
//!
//! The window tracks the tick at which the counter was last drained. Elapsed
//! time is computed with wrapping subtraction so a rollover of the 32-bit
//! millisecond tick does not stall or double-fire a window.

use crate::core::clock::Millis;
use crate::core::counter::{PulseCount, PulseCounter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One window's accumulated count and timing. Produced once, consumed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    /// Sequence number of this window since the node started
    pub index: u64,
    /// Pulses counted during the window
    pub count: PulseCount,
    /// Time since the previous drain
    pub window_duration: Duration,
    /// Tick at which the counter was drained
    pub captured_at: Millis,
}

impl WindowSnapshot {
    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_duration.as_millis() as u64
    }
}

/// Drains the pulse counter on a fixed period.
#[derive(Debug)]
pub struct AggregationWindow {
    counter: Arc<PulseCounter>,
    last_drain_time: Millis,
    next_index: u64,
}

impl AggregationWindow {
    /// Create a window whose first period starts at `started_at`.
    pub fn new(counter: Arc<PulseCounter>, started_at: Millis) -> Self {
        Self {
            counter,
            last_drain_time: started_at,
            next_index: 0,
        }
    }

    /// Milliseconds since the last drain, tolerant of tick wraparound.
    pub fn elapsed(&self, now: Millis) -> Millis {
        now.wrapping_sub(self.last_drain_time)
    }

    pub fn last_drain_time(&self) -> Millis {
        self.last_drain_time
    }

    /// Drain the counter if at least `period` has elapsed since the last drain.
    pub fn tick(&mut self, now: Millis, period: Millis) -> Option<WindowSnapshot> {
        if self.elapsed(now) >= period {
            Some(self.drain_at(now))
        } else {
            None
        }
    }

    /// Drain unconditionally, producing a possibly short final window.
    pub fn flush(&mut self, now: Millis) -> WindowSnapshot {
        self.drain_at(now)
    }

    fn drain_at(&mut self, now: Millis) -> WindowSnapshot {
        let elapsed = self.elapsed(now);
        let count = self.counter.drain();
        self.last_drain_time = now;

        let index = self.next_index;
        self.next_index += 1;

        WindowSnapshot {
            index,
            count,
            window_duration: Duration::from_millis(elapsed as u64),
            captured_at: now,
        }
    }
}
