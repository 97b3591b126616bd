//! Integration tests for the counting and reporting cycle

use geiger_sensor_agent::core::{ManualClock, TelemetryPayload, TimestampMode};
use geiger_sensor_agent::indicator::Indicator;
use geiger_sensor_agent::reporter::{IngestRequest, IngestResponse, Transport};
use geiger_sensor_agent::source::{Edge, EdgeFilter, GpiomonSource, PulseSource};
use geiger_sensor_agent::stats::create_shared_stats;
use geiger_sensor_agent::{
    AggregationWindow, Clock, DeliveryOutcome, PulseCounter, ReportingScheduler, TelemetryReporter,
    TransportError,
};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const PERIOD_MS: u32 = 10_000;

/// Transport that plays back scripted results and records every request.
#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<IngestResponse, TransportError>>>>,
    requests: Arc<Mutex<Vec<IngestRequest>>>,
    /// Pulses injected while the request is in flight
    during_post: Option<(Arc<PulseCounter>, u32)>,
}

impl ScriptedTransport {
    fn push_ok(&self) {
        self.script.lock().unwrap().push_back(Ok(IngestResponse {
            status: 200,
            body: "OK".to_string(),
        }));
    }

    fn push_unreachable(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Connect("connection refused".to_string())));
    }

    fn sent_clicks(&self) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| TelemetryPayload::decode(&r.body).unwrap().clicks)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn post(&self, request: &IngestRequest) -> Result<IngestResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some((counter, pulses)) = &self.during_post {
            for _ in 0..*pulses {
                counter.on_edge();
            }
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(IngestResponse {
            status: 200,
            body: "OK".to_string(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal {
    Pulse,
    Alarm(bool),
}

#[derive(Clone, Default)]
struct RecordingIndicator {
    signals: Arc<Mutex<Vec<Signal>>>,
}

impl RecordingIndicator {
    fn alarm(&self) -> bool {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|s| match s {
                Signal::Alarm(on) => Some(*on),
                Signal::Pulse => None,
            })
            .unwrap_or(false)
    }

    fn pulses(&self) -> usize {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == Signal::Pulse)
            .count()
    }
}

impl Indicator for RecordingIndicator {
    fn pulse(&mut self) {
        self.signals.lock().unwrap().push(Signal::Pulse);
    }

    fn set_alarm(&mut self, on: bool) {
        self.signals.lock().unwrap().push(Signal::Alarm(on));
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    counter: Arc<PulseCounter>,
    transport: ScriptedTransport,
    indicator: RecordingIndicator,
    scheduler: ReportingScheduler<ScriptedTransport, RecordingIndicator>,
}

fn harness_at(start_ms: u64, transport: ScriptedTransport, counter: Arc<PulseCounter>) -> Harness {
    let clock = Arc::new(ManualClock::new(start_ms));
    let indicator = RecordingIndicator::default();
    let window = AggregationWindow::new(counter.clone(), clock.millis());
    let reporter = TelemetryReporter::new(
        transport.clone(),
        "https://rad.example.dev/ingest",
        "device-secret",
        TimestampMode::Uptime,
        clock.clone(),
    );
    let scheduler = ReportingScheduler::new(
        window,
        reporter,
        indicator.clone(),
        clock.clone(),
        PERIOD_MS,
        create_shared_stats(),
    );
    Harness {
        clock,
        counter,
        transport,
        indicator,
        scheduler,
    }
}

fn harness() -> Harness {
    harness_at(0, ScriptedTransport::default(), Arc::new(PulseCounter::new()))
}

/// Advance the clock to `now` and tick once.
fn tick_at(h: &mut Harness, now: u64) -> Option<DeliveryOutcome> {
    h.clock.set(now);
    h.scheduler.tick()
}

#[test]
fn test_pulses_split_at_the_drain() {
    let mut h = harness();

    for now in [100, 200, 9_999] {
        assert!(tick_at(&mut h, now).is_none());
        h.counter.on_edge();
    }

    let outcome = tick_at(&mut h, 10_050).expect("first window closes");
    assert!(outcome.is_success());
    assert_eq!(h.transport.sent_clicks(), vec![3]);

    for now in [10_051, 15_000, 19_999] {
        h.counter.on_edge();
        assert!(tick_at(&mut h, now).is_none());
    }

    tick_at(&mut h, 20_050).expect("second window closes");
    assert_eq!(h.transport.sent_clicks(), vec![3, 3]);
}

#[test]
fn test_transport_failure_does_not_shift_the_window() {
    let mut h = harness();
    h.transport.push_unreachable();

    let outcome = tick_at(&mut h, 10_000).expect("window closes");
    assert!(matches!(outcome, DeliveryOutcome::TransportFailure { .. }));

    // No immediate retry: the next report waits a full period.
    for now in [10_001, 12_000, 19_999] {
        assert!(tick_at(&mut h, now).is_none());
    }
    assert_eq!(h.transport.requests.lock().unwrap().len(), 1);

    assert!(tick_at(&mut h, 20_000).is_some());
    assert_eq!(h.transport.requests.lock().unwrap().len(), 2);
}

#[test]
fn test_unreachable_windows_are_dropped_not_accumulated() {
    let mut h = harness();
    for _ in 0..3 {
        h.transport.push_unreachable();
    }
    h.transport.push_ok();

    let per_window = [2u32, 5, 1, 4];
    let mut outcomes = Vec::new();
    for (i, pulses) in per_window.iter().enumerate() {
        for _ in 0..*pulses {
            h.counter.on_edge();
        }
        let now = (i as u64 + 1) * PERIOD_MS as u64;
        outcomes.push(tick_at(&mut h, now).expect("window closes"));

        if i < 3 {
            assert!(h.indicator.alarm(), "alarm held while unreachable");
        }
    }

    assert_eq!(h.transport.sent_clicks(), per_window.to_vec());
    assert!(outcomes[..3]
        .iter()
        .all(|o| matches!(o, DeliveryOutcome::TransportFailure { .. })));
    assert!(outcomes[3].is_success());
    assert!(!h.indicator.alarm());
    assert_eq!(h.indicator.pulses(), 4);
}

#[test]
fn test_pulses_during_report_go_to_next_window() {
    let counter = Arc::new(PulseCounter::new());
    let transport = ScriptedTransport {
        during_post: Some((counter.clone(), 6)),
        ..ScriptedTransport::default()
    };
    let mut h = harness_at(0, transport, counter);

    h.counter.on_edge();
    tick_at(&mut h, 10_000).expect("first window");
    assert_eq!(h.counter.pending(), 6);

    tick_at(&mut h, 20_000).expect("second window");
    assert_eq!(h.transport.sent_clicks(), vec![1, 6]);
}

#[test]
fn test_window_survives_tick_wraparound() {
    let start = u32::MAX as u64 - 5_000;
    let mut h = harness_at(start, ScriptedTransport::default(), Arc::new(PulseCounter::new()));

    h.counter.on_edge();
    // 9_999 ms later the 32-bit tick has wrapped but the period has not elapsed.
    assert!(tick_at(&mut h, start + 9_999).is_none());
    assert!(tick_at(&mut h, start + 10_000).is_some());
    assert_eq!(h.transport.sent_clicks(), vec![1]);
}

#[test]
fn test_concurrent_pulses_are_reported_exactly_once() {
    let mut h = harness();
    let total = Arc::new(AtomicU64::new(0));
    let running = Arc::new(AtomicBool::new(true));

    let producer = {
        let counter = h.counter.clone();
        let total = total.clone();
        let running = running.clone();
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                counter.on_edge();
                total.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(50));
            }
        })
    };

    for step in 1..=200u64 {
        tick_at(&mut h, step * 1_000);
        thread::sleep(Duration::from_micros(200));
    }
    running.store(false, Ordering::SeqCst);
    producer.join().unwrap();

    h.scheduler.finish();

    let reported: u64 = h.transport.sent_clicks().iter().map(|c| *c as u64).sum();
    assert_eq!(reported, total.load(Ordering::SeqCst));
    assert_eq!(h.counter.pending(), 0);
}

#[test]
fn test_payload_carries_uptime_at_report_time() {
    let mut h = harness();
    tick_at(&mut h, 10_003).expect("window closes");

    let requests = h.transport.requests.lock().unwrap();
    let payload = TelemetryPayload::decode(&requests[0].body).unwrap();
    assert_eq!(payload.clicks, 0);
    assert_eq!(payload.ts, 10_003);
    assert_eq!(requests[0].header("Authorization"), Some("Bearer device-secret"));
}

#[test]
fn test_finite_input_stops_reporting_and_holds_alarm() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for ts in 1..=3 {
        writeln!(file, "event: FALLING EDGE offset: 14 timestamp: [{ts}.000000000]").unwrap();
    }
    file.flush().unwrap();

    let counter = Arc::new(PulseCounter::new());
    let mut source = GpiomonSource::new(
        EdgeFilter {
            pin: 14,
            edge: Edge::Falling,
        },
        Some(file.path().to_path_buf()),
    );
    source.start(counter.clone()).unwrap();

    let Harness {
        clock,
        transport,
        indicator,
        scheduler,
        ..
    } = harness_at(0, ScriptedTransport::default(), counter.clone());
    let mut scheduler = scheduler.with_input(source.alive_flag());

    let deadline = Instant::now() + Duration::from_secs(5);
    while source.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!source.is_running(), "input should end at end of file");

    clock.set(2_000);
    let outcome = scheduler.tick().expect("closure reports the counts so far");
    assert!(outcome.is_success());
    assert!(scheduler.input_closed());
    assert!(indicator.alarm());

    // A dead input must not keep producing zero-count reports.
    for now in [12_000, 22_000, 32_000] {
        clock.set(now);
        assert!(scheduler.tick().is_none());
    }
    assert_eq!(transport.sent_clicks(), vec![3]);

    let running = AtomicBool::new(true);
    scheduler.run(&running, Duration::from_millis(1));
    source.stop();
}
