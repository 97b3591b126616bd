//! Geiger Sensor Agent CLI
//!
//! Counts Geiger-Müller tube pulses and reports windowed counts.

use anyhow::Context;
use clap::{Parser, Subcommand};
use geiger_sensor_agent::{
    config::Config,
    context::DeviceContext,
    core::TimestampMode,
    indicator::{Indicator, LogIndicator, SysfsLed},
    reporter::Transport,
    scheduler::Heartbeat,
    source::{build_source, Edge, SourceKind},
    transport::{DisabledTransport, HttpTransport},
    INSECURE_TLS_WARNING, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geiger-sensor")]
#[command(version = VERSION)]
#[command(about = "Geiger-Müller pulse counter with HTTPS telemetry", long_about = None)]
struct Cli {
    /// Log filter when RUST_LOG is not set (e.g. info, debug, geiger_sensor_agent=trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Per-run overrides for the config file.
#[derive(clap::Args, Default)]
struct Overrides {
    /// Ingestion endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Device bearer token
    #[arg(long, env = "GEIGER_DEVICE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Aggregation period in seconds
    #[arg(long)]
    period: Option<u64>,

    /// Timestamp semantics for the payload (uptime or epoch)
    #[arg(long)]
    timestamp: Option<TimestampMode>,

    /// Skip TLS certificate verification (dangerous)
    #[arg(long)]
    insecure: bool,

    /// Pulse source (gpiomon or simulated)
    #[arg(long)]
    source: Option<SourceKind>,

    /// gpiomon output file or FIFO (stdin when omitted)
    #[arg(long)]
    input: Option<PathBuf>,

    /// GPIO line offset the tube is wired to
    #[arg(long)]
    pin: Option<u32>,

    /// Qualifying edge (falling or rising)
    #[arg(long)]
    edge: Option<Edge>,

    /// Rate for the simulated source, counts per minute
    #[arg(long)]
    cpm: Option<u32>,

    /// Status LED name under /sys/class/leds
    #[arg(long)]
    led: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint_url = endpoint;
        }
        if let Some(token) = self.token {
            config.device_token = token;
        }
        if let Some(period) = self.period {
            config.period = Duration::from_secs(period);
        }
        if let Some(mode) = self.timestamp {
            config.timestamp_mode = mode;
        }
        if self.insecure {
            config.tls_verify = false;
        }
        if let Some(source) = self.source {
            config.input.source = source;
        }
        if let Some(input) = self.input {
            config.input.path = Some(input);
        }
        if let Some(pin) = self.pin {
            config.input.pin = pin;
        }
        if let Some(edge) = self.edge {
            config.input.edge = edge;
        }
        if let Some(cpm) = self.cpm {
            config.input.simulated_cpm = cpm;
        }
        if let Some(led) = self.led {
            config.indicator_led = Some(led);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start counting and reporting
    Start {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Send one zero-count report and print the outcome
    Probe {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the effective configuration (token redacted)
    Config,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run an in-memory ingestion sink for bench testing
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8787")]
        port: u16,

        /// Token devices must present
        #[arg(long, env = "GEIGER_DEVICE_TOKEN", hide_env_values = true)]
        token: String,

        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: std::net::IpAddr,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config_path = cli.config.unwrap_or_else(Config::config_path);

    let result = match cli.command {
        Commands::Start { overrides } => cmd_start(&config_path, overrides),
        Commands::Probe { overrides } => cmd_probe(&config_path, overrides),
        Commands::Config => cmd_config(&config_path),
        Commands::Init { force } => cmd_init(&config_path, force),
        #[cfg(feature = "server")]
        Commands::Serve { port, token, bind } => cmd_serve(port, token, bind),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &Path, overrides: Overrides) -> Config {
    let mut config = match Config::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load {path:?}: {e}");
            eprintln!("Continuing with defaults.");
            Config::default()
        }
    };
    overrides.apply(&mut config);
    config
}

/// Build the HTTPS transport, or a disabled one when reporting cannot work.
/// Counting proceeds either way.
fn build_transport(config: &Config) -> Box<dyn Transport> {
    if let Err(e) = config.validate() {
        tracing::error!("Reporting disabled: {e}");
        return Box::new(DisabledTransport::new(e.to_string()));
    }

    if !config.tls_verify {
        eprintln!("{INSECURE_TLS_WARNING}");
    }

    match HttpTransport::new(&config.transport_options()) {
        Ok(transport) => Box::new(transport),
        Err(e) => {
            tracing::error!("Reporting disabled: {e}");
            Box::new(DisabledTransport::new(e.to_string()))
        }
    }
}

fn build_indicator(config: &Config) -> Box<dyn Indicator> {
    match &config.indicator_led {
        Some(name) => Box::new(SysfsLed::new(name)),
        None => Box::new(LogIndicator::new()),
    }
}

fn cmd_start(config_path: &Path, overrides: Overrides) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides);
    if let Err(e) = config.validate_timing() {
        tracing::error!("Refusing to start: {e}");
        return Err(e).context("invalid timing configuration");
    }
    let context = DeviceContext::new(config);
    let config = &context.config;

    println!("Geiger Sensor Agent v{VERSION}");
    println!();
    println!("  Boot ID: {}", context.boot_id);
    println!("  Endpoint: {}", display_or_unset(&config.endpoint_url));
    println!("  Period: {}s", config.period.as_secs());
    println!("  Timestamps: {}", config.timestamp_mode);
    println!(
        "  TLS verification: {}",
        if config.tls_verify { "enabled" } else { "DISABLED" }
    );

    let transport = build_transport(config);
    let indicator = build_indicator(config);

    let mut source = build_source(&config.input);
    println!("  Pulse source: {}", source.describe());
    source
        .start(context.counter.clone())
        .context("starting pulse source")?;

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut scheduler = context
        .scheduler(transport, indicator)?
        .with_input(source.alive_flag());
    if config.heartbeat_secs > 0 {
        scheduler = scheduler.with_maintenance(Box::new(Heartbeat::new(
            Duration::from_secs(config.heartbeat_secs),
            context.clock.millis(),
            context.counter.clone(),
            context.stats.clone(),
        )));
    }

    tracing::info!(boot_id = %context.boot_id, "Counting started");
    scheduler.run(&running, config.tick_interval());

    println!();
    println!("Stopping...");

    let input_closed = scheduler.input_closed();
    if config.report_final_window && !input_closed {
        scheduler.finish();
    }
    source.stop();

    println!();
    println!("{}", context.stats.summary());

    if input_closed {
        anyhow::bail!("pulse input closed ({})", source.describe());
    }
    Ok(())
}

fn cmd_probe(config_path: &Path, overrides: Overrides) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides);
    config.validate().context("configuration cannot report")?;

    let context = DeviceContext::new(config);
    let transport = build_transport(&context.config);
    let mut reporter = context.reporter(transport);

    let snapshot = context.window().flush(context.clock.millis());
    println!("Probing {} ...", reporter.endpoint());
    let outcome = reporter.report(snapshot);
    println!("{outcome}");

    if outcome.is_success() {
        Ok(())
    } else {
        anyhow::bail!("probe did not succeed ({})", outcome.label())
    }
}

fn cmd_config(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load_from(config_path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);

    if let Err(e) = config.validate() {
        println!();
        println!("Warning: {e}");
    }
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!("{config_path:?} already exists (use --force to overwrite)");
    }
    Config::default().save_to(config_path)?;
    println!("Wrote default configuration to {config_path:?}");
    println!("Set endpoint_url and device_token before running `geiger-sensor start`.");
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16, token: String, bind: std::net::IpAddr) -> anyhow::Result<()> {
    use geiger_sensor_agent::server::{run, SinkConfig};

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let config = SinkConfig::new(port, token).with_bind(bind);
        let (addr, shutdown_tx) = run(config).await?;
        println!("Ingestion sink on http://{addr}/ingest (Ctrl+C to stop)");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        Ok(())
    })
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
