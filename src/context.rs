//! Per-device context handed to each component at construction.
//!
//! The context owns configuration and the shared clock. The pulse counter is
//! shared with exactly one writer (the pulse source) and one drainer (the
//! aggregation window).

use crate::config::{Config, ConfigError};
use crate::core::clock::{Clock, SystemClock};
use crate::core::counter::PulseCounter;
use crate::core::window::AggregationWindow;
use crate::indicator::Indicator;
use crate::reporter::{TelemetryReporter, Transport};
use crate::scheduler::ReportingScheduler;
use crate::stats::{create_shared_stats, SharedStats};
use std::sync::Arc;
use uuid::Uuid;

pub struct DeviceContext {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub counter: Arc<PulseCounter>,
    pub stats: SharedStats,
    /// Identifies this run in logs
    pub boot_id: Uuid,
}

impl DeviceContext {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            counter: Arc::new(PulseCounter::new()),
            stats: create_shared_stats(),
            boot_id: Uuid::new_v4(),
        }
    }

    /// Aggregation window whose first period starts now.
    pub fn window(&self) -> AggregationWindow {
        AggregationWindow::new(self.counter.clone(), self.clock.millis())
    }

    pub fn reporter<T: Transport>(&self, transport: T) -> TelemetryReporter<T> {
        TelemetryReporter::new(
            transport,
            self.config.endpoint_url.clone(),
            self.config.device_token.clone(),
            self.config.timestamp_mode,
            self.clock.clone(),
        )
    }

    /// Scheduler over a fresh window and reporter. Fails on timing settings
    /// that would report on every tick or time out every report.
    pub fn scheduler<T: Transport, I: Indicator>(
        &self,
        transport: T,
        indicator: I,
    ) -> Result<ReportingScheduler<T, I>, ConfigError> {
        self.config.validate_timing()?;
        Ok(ReportingScheduler::new(
            self.window(),
            self.reporter(transport),
            indicator,
            self.clock.clone(),
            self.config.period_millis(),
            self.stats.clone(),
        ))
    }
}
