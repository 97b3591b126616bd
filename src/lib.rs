//! Geiger Sensor Agent - pulse counting and telemetry reporting for a
//! Geiger-Müller tube node.
//!
//! The node counts tube pulses, drains the count on a fixed period and posts
//! each window's raw count to an ingestion endpoint over HTTPS. It does not
//! compute dose rates; interpretation is left to the backend.
//!
//! # Guarantees
//!
//! - **No lost pulses**: every edge is counted in exactly one window
//! - **Counting never stops**: network and configuration failures only affect reporting
//! - **No backlog**: a window that fails to report is dropped, never retried
//! - **Nothing persisted**: a power cycle starts from zero
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Geiger Sensor Agent                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Source    │──▶│   Pulse     │──▶│ Aggregation │        │
//! │  │  (thread)   │   │  Counter    │   │   Window    │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                                             │               │
//! │                                             ▼               │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Indicator  │◀──│  Reporting  │──▶│  Telemetry  │──▶ HTTPS
//! │  │   + Stats   │   │  Scheduler  │   │  Reporter   │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use geiger_sensor_agent::{
//!     config::Config, context::DeviceContext, indicator::LogIndicator,
//!     scheduler::ReportingScheduler, source::SimulatedSource, source::PulseSource,
//!     transport::HttpTransport,
//! };
//!
//! let context = DeviceContext::new(Config::load().unwrap_or_default());
//! let mut source = SimulatedSource::new(30);
//! source.start(context.counter.clone()).expect("Failed to start source");
//!
//! let transport = HttpTransport::new(&context.config.transport_options()).unwrap();
//! let mut scheduler = ReportingScheduler::new(
//!     context.window(),
//!     context.reporter(transport),
//!     LogIndicator::new(),
//!     context.clock.clone(),
//!     context.config.period_millis(),
//!     context.stats.clone(),
//! );
//! scheduler.tick();
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod indicator;
pub mod reporter;
pub mod scheduler;
pub mod source;
pub mod stats;
pub mod transport;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, InputConfig};
pub use context::DeviceContext;
pub use crate::core::{
    AggregationWindow, Clock, PulseCount, PulseCounter, TelemetryPayload, TimestampMode,
    WindowSnapshot,
};
pub use reporter::{DeliveryOutcome, TelemetryReporter, Transport};
pub use scheduler::{ReportingScheduler, SchedulerState};
pub use stats::{NodeStats, SharedStats};
pub use transport::{HttpTransport, TlsPolicy, TransportError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Warning shown whenever certificate verification is turned off.
pub const INSECURE_TLS_WARNING: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            TLS CERTIFICATE VERIFICATION IS DISABLED              ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Reports will be sent to any server that answers for the         ║
║  endpoint's address, including an attacker on the network path.  ║
║  The device token travels with every report and can be stolen.   ║
║                                                                  ║
║  Only use this on a closed bench network, or when the endpoint   ║
║  certificate cannot be validated and you accept the risk.        ║
║                                                                  ║
║  Re-enable with `"tls_verify": true` in the config file.         ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
