//! Demonstration of the counting and reporting cycle without hardware.
//!
//! This example shows how to:
//! 1. Feed the pulse counter from a simulated tube
//! 2. Close fixed-period windows with the reporting scheduler
//! 3. Inspect the exact request each window would send
//!
//! Run with: cargo run --example simulate
//!
//! No network traffic is generated; requests are printed instead of posted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geiger_sensor_agent::{
    context::DeviceContext,
    indicator::LogIndicator,
    reporter::{IngestRequest, IngestResponse, Transport},
    scheduler::ReportingScheduler,
    source::{PulseSource, SimulatedSource},
    Config, TransportError,
};

/// Prints each request and answers 200.
struct PrintTransport;

impl Transport for PrintTransport {
    fn post(&self, request: &IngestRequest) -> Result<IngestResponse, TransportError> {
        println!("POST {}", request.url);
        for (name, value) in &request.headers {
            let shown = if *name == "Authorization" { "Bearer ****" } else { value.as_str() };
            println!("  {name}: {shown}");
        }
        println!("  {}", request.body);
        Ok(IngestResponse {
            status: 200,
            body: "OK".to_string(),
        })
    }
}

fn main() {
    println!("Geiger Sensor Agent - Simulation Demo");
    println!("=====================================");
    println!();

    let config = Config {
        endpoint_url: "https://rad.example.dev/ingest".to_string(),
        device_token: "demo-token".to_string(),
        period: Duration::from_secs(5),
        ..Config::default()
    };
    let context = DeviceContext::new(config);

    // Roughly background radiation on an SBM-20
    let mut source = SimulatedSource::new(120);
    if let Err(e) = source.start(context.counter.clone()) {
        eprintln!("Error starting source: {e}");
        return;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Boot ID: {}", context.boot_id);
    println!("Counting for 20 seconds in 5 second windows...");
    println!();

    let mut scheduler = ReportingScheduler::new(
        context.window(),
        context.reporter(PrintTransport),
        LogIndicator::new(),
        context.clock.clone(),
        context.config.period_millis(),
        context.stats.clone(),
    );

    let deadline = std::time::Instant::now() + Duration::from_secs(20);
    while running.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
        if let Some(outcome) = scheduler.tick() {
            println!("=> {outcome}");
            println!();
        }
        std::thread::sleep(context.config.tick_interval());
    }

    scheduler.finish();
    source.stop();

    println!();
    println!("{}", context.stats.summary());
}
