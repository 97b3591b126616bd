//! Time sources for the node.
//!
//! The aggregation logic works on a wrapping 32-bit millisecond counter, the
//! same shape as a microcontroller `millis()` tick, so window arithmetic must
//! always use wrapping subtraction. Payload timestamps use the full 64-bit
//! uptime or, when available, wall-clock epoch milliseconds.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Wrapping monotonic milliseconds.
pub type Millis = u32;

/// Epoch milliseconds below this are not a plausible synchronized wall clock.
pub const MIN_PLAUSIBLE_EPOCH_MS: u64 = 1_000_000_000_000;

/// A source of monotonic and (optionally) wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the node started.
    fn uptime_ms(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch, if the clock is synchronized.
    fn epoch_ms(&self) -> Option<u64>;

    /// Uptime truncated to the wrapping tick width.
    fn millis(&self) -> Millis {
        self.uptime_ms() as Millis
    }
}

/// Clock backed by `Instant` for uptime and the system clock for epoch time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn epoch_ms(&self) -> Option<u64> {
        let now = Utc::now().timestamp_millis();
        u64::try_from(now)
            .ok()
            .filter(|ms| *ms >= MIN_PLAUSIBLE_EPOCH_MS)
    }
}

/// Manually driven clock for tests and simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    uptime_ms: AtomicU64,
    epoch_offset_ms: Option<u64>,
}

impl ManualClock {
    /// Create a clock at the given uptime with no wall-clock time.
    pub fn new(uptime_ms: u64) -> Self {
        Self {
            uptime_ms: AtomicU64::new(uptime_ms),
            epoch_offset_ms: None,
        }
    }

    /// Create a clock whose epoch time is `boot_epoch_ms + uptime`.
    pub fn with_epoch(uptime_ms: u64, boot_epoch_ms: u64) -> Self {
        Self {
            uptime_ms: AtomicU64::new(uptime_ms),
            epoch_offset_ms: Some(boot_epoch_ms),
        }
    }

    pub fn set(&self, uptime_ms: u64) {
        self.uptime_ms.store(uptime_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.uptime_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.load(Ordering::SeqCst)
    }

    fn epoch_ms(&self) -> Option<u64> {
        self.epoch_offset_ms
            .map(|boot| boot + self.uptime_ms())
            .filter(|ms| *ms >= MIN_PLAUSIBLE_EPOCH_MS)
    }
}
