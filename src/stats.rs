//! In-memory node statistics.
//!
//! Tracks what the node has counted and reported during this run. Nothing
//! here is persisted; a power cycle starts from zero.

use crate::reporter::DeliveryOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Counters for the current run.
#[derive(Debug)]
pub struct NodeStats {
    /// Pulses included in completed windows
    pulses_counted: AtomicU64,
    /// Windows drained
    windows_completed: AtomicU64,
    /// Reports answered with 2xx
    reports_succeeded: AtomicU64,
    /// Reports answered with a non-2xx status
    protocol_failures: AtomicU64,
    /// Reports that got no response
    transport_failures: AtomicU64,
    /// Run start time
    started_at: DateTime<Utc>,
    /// Most recent status line
    last_status: Mutex<Option<String>>,
}

impl NodeStats {
    pub fn new() -> Self {
        Self {
            pulses_counted: AtomicU64::new(0),
            windows_completed: AtomicU64::new(0),
            reports_succeeded: AtomicU64::new(0),
            protocol_failures: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            started_at: Utc::now(),
            last_status: Mutex::new(None),
        }
    }

    /// Record a drained window and its count.
    pub fn record_window(&self, count: u32) {
        self.windows_completed.fetch_add(1, Ordering::Relaxed);
        self.pulses_counted.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record the outcome of a report attempt.
    pub fn record_outcome(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Success { .. } => &self.reports_succeeded,
            DeliveryOutcome::ProtocolFailure { .. } => &self.protocol_failures,
            DeliveryOutcome::TransportFailure { .. } => &self.transport_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut last) = self.last_status.lock() {
            *last = Some(outcome.to_string());
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pulses_counted: self.pulses_counted.load(Ordering::Relaxed),
            windows_completed: self.windows_completed.load(Ordering::Relaxed),
            reports_succeeded: self.reports_succeeded.load(Ordering::Relaxed),
            protocol_failures: self.protocol_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
            run_duration_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            last_status: self.last_status.lock().ok().and_then(|s| s.clone()),
        }
    }

    /// Summary for display at shutdown.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Run Statistics:\n\
             - Pulses counted: {}\n\
             - Windows completed: {}\n\
             - Reports delivered: {}\n\
             - Reports rejected (non-2xx): {}\n\
             - Reports failed (no response): {}\n\
             - Run duration: {} seconds\n\
             - Last status: {}",
            stats.pulses_counted,
            stats.windows_completed,
            stats.reports_succeeded,
            stats.protocol_failures,
            stats.transport_failures,
            stats.run_duration_secs,
            stats.last_status.as_deref().unwrap_or("none")
        )
    }
}

impl Default for NodeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`NodeStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub pulses_counted: u64,
    pub windows_completed: u64,
    pub reports_succeeded: u64,
    pub protocol_failures: u64,
    pub transport_failures: u64,
    pub started_at: DateTime<Utc>,
    pub run_duration_secs: u64,
    pub last_status: Option<String>,
}

/// Thread-safe shared statistics.
pub type SharedStats = Arc<NodeStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(NodeStats::new())
}
