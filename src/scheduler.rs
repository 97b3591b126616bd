//! Reporting scheduler: the node's main loop.
//!
//! Each tick services background maintenance, asks the aggregation window
//! whether a period has elapsed and, if it has, reports the snapshot before
//! returning to idle. The report blocks the loop for at most the transport
//! timeout. Pulses keep accumulating in the counter during that stall, but the
//! next period check is delayed until the call returns. The window itself is
//! anchored at the drain tick, so a slow report does not stretch the next
//! window's nominal start.
//!
//! When a pulse input is attached and it closes (end of file, or the process
//! feeding it died), the scheduler reports what was counted up to that point,
//! holds the indicator alarm and stops reporting. Zero-count windows from a
//! dead input would be indistinguishable from a quiet tube.

use crate::core::clock::{Clock, Millis};
use crate::core::counter::PulseCounter;
use crate::core::window::{AggregationWindow, WindowSnapshot};
use crate::indicator::Indicator;
use crate::reporter::{DeliveryOutcome, TelemetryReporter, Transport};
use crate::stats::SharedStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Where the scheduler is within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Aggregating,
    Reporting,
}

/// Platform work that must run on every tick regardless of aggregation state.
pub trait Maintenance {
    fn service(&mut self, now: Millis);
}

/// Logs a liveness line with the pending count at a fixed interval.
pub struct Heartbeat {
    interval: Millis,
    last: Millis,
    counter: Arc<PulseCounter>,
    stats: SharedStats,
}

impl Heartbeat {
    pub fn new(interval: Duration, started_at: Millis, counter: Arc<PulseCounter>, stats: SharedStats) -> Self {
        Self {
            interval: Millis::try_from(interval.as_millis()).unwrap_or(Millis::MAX),
            last: started_at,
            counter,
            stats,
        }
    }
}

impl Maintenance for Heartbeat {
    fn service(&mut self, now: Millis) {
        if now.wrapping_sub(self.last) < self.interval {
            return;
        }
        self.last = now;
        let stats = self.stats.snapshot();
        tracing::info!(
            pending = self.counter.pending(),
            windows = stats.windows_completed,
            delivered = stats.reports_succeeded,
            "heartbeat"
        );
    }
}

/// Drives aggregation and reporting on a fixed cadence.
pub struct ReportingScheduler<T: Transport, I: Indicator> {
    window: AggregationWindow,
    reporter: TelemetryReporter<T>,
    indicator: I,
    maintenance: Vec<Box<dyn Maintenance + Send>>,
    clock: Arc<dyn Clock>,
    period: Millis,
    stats: SharedStats,
    state: SchedulerState,
    input: Option<Arc<AtomicBool>>,
    input_closed: bool,
}

impl<T: Transport, I: Indicator> ReportingScheduler<T, I> {
    pub fn new(
        window: AggregationWindow,
        reporter: TelemetryReporter<T>,
        indicator: I,
        clock: Arc<dyn Clock>,
        period: Millis,
        stats: SharedStats,
    ) -> Self {
        Self {
            window,
            reporter,
            indicator,
            maintenance: Vec::new(),
            clock,
            period,
            stats,
            state: SchedulerState::Idle,
            input: None,
            input_closed: false,
        }
    }

    /// Watch a pulse input's liveness flag; reporting stops once it clears.
    pub fn with_input(mut self, alive: Arc<AtomicBool>) -> Self {
        self.input = Some(alive);
        self
    }

    /// True once the watched input has closed.
    pub fn input_closed(&self) -> bool {
        self.input_closed
    }

    /// Register work to run on every tick.
    pub fn with_maintenance(mut self, task: Box<dyn Maintenance + Send>) -> Self {
        self.maintenance.push(task);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn reporter(&self) -> &TelemetryReporter<T> {
        &self.reporter
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Run one non-blocking check. Returns the outcome if a report was made.
    pub fn tick(&mut self) -> Option<DeliveryOutcome> {
        let now = self.clock.millis();
        for task in &mut self.maintenance {
            task.service(now);
        }

        if self.input_closed {
            return None;
        }
        if self
            .input
            .as_ref()
            .is_some_and(|alive| !alive.load(Ordering::SeqCst))
        {
            return Some(self.close_input(now));
        }

        self.state = SchedulerState::Aggregating;
        let Some(snapshot) = self.window.tick(now, self.period) else {
            self.state = SchedulerState::Idle;
            return None;
        };

        Some(self.deliver(snapshot))
    }

    /// Drain whatever is left, regardless of the period, and report it.
    pub fn finish(&mut self) -> DeliveryOutcome {
        let snapshot = self.window.flush(self.clock.millis());
        tracing::info!(
            clicks = snapshot.count,
            window_ms = snapshot.window_ms(),
            "Reporting final partial window"
        );
        self.deliver(snapshot)
    }

    /// Tick until `running` is cleared or the watched input closes.
    pub fn run(&mut self, running: &AtomicBool, tick_interval: Duration) {
        while running.load(Ordering::SeqCst) && !self.input_closed {
            self.tick();
            thread::sleep(tick_interval);
        }
    }

    fn close_input(&mut self, now: Millis) -> DeliveryOutcome {
        self.input_closed = true;
        tracing::error!("Pulse input closed; reporting the counts so far and stopping");

        let snapshot = self.window.flush(now);
        let outcome = self.deliver(snapshot);
        self.indicator.set_alarm(true);
        outcome
    }

    fn deliver(&mut self, snapshot: WindowSnapshot) -> DeliveryOutcome {
        self.stats.record_window(snapshot.count);

        self.state = SchedulerState::Reporting;
        let outcome = self.reporter.report(snapshot);
        self.state = SchedulerState::Idle;

        self.signal(&snapshot, &outcome);
        self.stats.record_outcome(&outcome);
        outcome
    }

    fn signal(&mut self, snapshot: &WindowSnapshot, outcome: &DeliveryOutcome) {
        let window_ms = snapshot.window_ms();
        match outcome {
            DeliveryOutcome::Success { status, body } => {
                tracing::info!(
                    outcome = outcome.label(),
                    status,
                    clicks = snapshot.count,
                    window_ms,
                    body = %body.trim(),
                    "POST => {status}"
                );
            }
            DeliveryOutcome::ProtocolFailure { status, body } => {
                tracing::warn!(
                    outcome = outcome.label(),
                    status,
                    clicks = snapshot.count,
                    window_ms,
                    body = %body.trim(),
                    "POST => {status}, endpoint rejected the report"
                );
            }
            DeliveryOutcome::TransportFailure { reason } => {
                tracing::warn!(
                    outcome = outcome.label(),
                    clicks = snapshot.count,
                    window_ms,
                    reason = %reason,
                    "Report dropped, no response from endpoint"
                );
            }
        }

        self.indicator.set_alarm(!outcome.response_received());
        self.indicator.pulse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::payload::TimestampMode;
    use crate::indicator::LogIndicator;
    use crate::reporter::{IngestRequest, IngestResponse};
    use crate::stats::create_shared_stats;
    use crate::transport::TransportError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingTransport {
        calls: Mutex<u32>,
    }

    impl Transport for CountingTransport {
        fn post(&self, _request: &IngestRequest) -> Result<IngestResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            Ok(IngestResponse {
                status: 200,
                body: "OK".to_string(),
            })
        }
    }

    struct CountingMaintenance(Arc<Mutex<u32>>);

    impl Maintenance for CountingMaintenance {
        fn service(&mut self, _now: Millis) {
            *self.0.lock().unwrap() += 1;
        }
    }

    fn scheduler(clock: Arc<ManualClock>) -> (Arc<PulseCounter>, ReportingScheduler<CountingTransport, LogIndicator>) {
        let counter = Arc::new(PulseCounter::new());
        let window = AggregationWindow::new(counter.clone(), clock.millis());
        let reporter = TelemetryReporter::new(
            CountingTransport::default(),
            "http://127.0.0.1/ingest",
            "token",
            TimestampMode::Uptime,
            clock.clone(),
        );
        let scheduler = ReportingScheduler::new(
            window,
            reporter,
            LogIndicator::new(),
            clock,
            10_000,
            create_shared_stats(),
        );
        (counter, scheduler)
    }

    #[test]
    fn test_tick_idle_until_period() {
        let clock = Arc::new(ManualClock::new(0));
        let (counter, mut scheduler) = scheduler(clock.clone());

        counter.on_edge();
        clock.set(9_999);
        assert!(scheduler.tick().is_none());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(*scheduler.reporter().transport().calls.lock().unwrap(), 0);

        clock.set(10_000);
        let outcome = scheduler.tick().expect("period elapsed");
        assert!(outcome.is_success());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(*scheduler.reporter().transport().calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_maintenance_runs_every_tick() {
        let clock = Arc::new(ManualClock::new(0));
        let serviced = Arc::new(Mutex::new(0));
        let (_counter, scheduler) = scheduler(clock.clone());
        let mut scheduler =
            scheduler.with_maintenance(Box::new(CountingMaintenance(serviced.clone())));

        for step in 1..=5 {
            clock.set(step * 1_000);
            scheduler.tick();
        }
        assert_eq!(*serviced.lock().unwrap(), 5);
    }

    #[test]
    fn test_finish_reports_partial_window() {
        let clock = Arc::new(ManualClock::new(0));
        let (counter, mut scheduler) = scheduler(clock.clone());

        counter.on_edge();
        clock.set(4_000);
        assert!(scheduler.finish().is_success());
        assert_eq!(counter.pending(), 0);
        assert_eq!(*scheduler.reporter().transport().calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_closed_input_reports_once_then_stops() {
        let clock = Arc::new(ManualClock::new(0));
        let alive = Arc::new(AtomicBool::new(true));
        let (counter, scheduler) = scheduler(clock.clone());
        let mut scheduler = scheduler.with_input(alive.clone());

        counter.on_edge();
        counter.on_edge();
        alive.store(false, Ordering::SeqCst);
        clock.set(3_000);

        let outcome = scheduler.tick().expect("counts before closure are reported");
        assert!(outcome.is_success());
        assert!(scheduler.input_closed());
        assert!(scheduler.indicator().alarm());
        assert_eq!(counter.pending(), 0);

        for step in 1..=3 {
            clock.set(3_000 + step * 10_000);
            assert!(scheduler.tick().is_none());
        }
        assert_eq!(*scheduler.reporter().transport().calls.lock().unwrap(), 1);

        let running = AtomicBool::new(true);
        scheduler.run(&running, Duration::from_millis(1));
    }

    #[test]
    fn test_live_input_does_not_interrupt_windows() {
        let clock = Arc::new(ManualClock::new(0));
        let (_counter, scheduler) = scheduler(clock.clone());
        let mut scheduler = scheduler.with_input(Arc::new(AtomicBool::new(true)));

        clock.set(5_000);
        assert!(scheduler.tick().is_none());
        clock.set(10_000);
        assert!(scheduler.tick().is_some());
        assert!(!scheduler.input_closed());
        assert!(!scheduler.indicator().alarm());
    }

    #[test]
    fn test_run_stops_when_flag_cleared() {
        let clock = Arc::new(ManualClock::new(0));
        let (_counter, mut scheduler) = scheduler(clock);
        let running = AtomicBool::new(false);

        scheduler.run(&running, Duration::from_millis(1));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
