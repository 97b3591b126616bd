//! Configuration for the Geiger Sensor Agent.
//!
//! Everything here is static per device and resolved before the counter
//! starts. Network bring-up and firmware updates belong to the platform and
//! are not configured here.

use crate::core::clock::Millis;
use crate::core::payload::TimestampMode;
use crate::source::types::{Edge, SourceKind};
use crate::transport::{default_user_agent, TlsPolicy, TransportOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the sensor agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingestion endpoint, e.g. `https://rad.example.workers.dev/ingest`
    pub endpoint_url: String,

    /// Bearer token identifying this device
    pub device_token: String,

    /// Aggregation window length
    #[serde(with = "duration_serde")]
    pub period: Duration,

    /// Meaning of the payload's `ts` field
    pub timestamp_mode: TimestampMode,

    /// Validate the endpoint's TLS certificate. Turning this off lets anyone
    /// on the network path read the device token.
    pub tls_verify: bool,

    /// Upper bound on a single report request
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Scheduler tick cadence in milliseconds
    pub tick_interval_ms: u64,

    /// Pulse input
    pub input: InputConfig,

    /// Status LED under /sys/class/leds, if the board has one
    pub indicator_led: Option<String>,

    /// Heartbeat log interval in seconds (0 disables)
    pub heartbeat_secs: u64,

    /// Report the partial window left over at shutdown
    pub report_final_window: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            device_token: String::new(),
            period: Duration::from_secs(10),
            timestamp_mode: TimestampMode::Uptime,
            tls_verify: true,
            request_timeout: Duration::from_secs(10),
            tick_interval_ms: 5,
            input: InputConfig::default(),
            indicator_led: None,
            heartbeat_secs: 300,
            report_final_window: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geiger-sensor-agent")
            .join("config.json")
    }

    /// Check the settings the scheduler cadence depends on. A zero period
    /// would close a window on every tick and a zero timeout fails every
    /// report, so the node must not start with either.
    pub fn validate_timing(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::Invalid("period must be at least 1 second".into()));
        }
        if self.period_millis() == Millis::MAX {
            return Err(ConfigError::Invalid("period is too long".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be at least 1 second".into(),
            ));
        }
        Ok(())
    }

    /// Check everything reporting depends on, timing included. Counting only
    /// needs [`Config::validate_timing`], so callers should keep counting
    /// when the endpoint settings alone are bad.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_timing()?;
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint URL is not set".into()));
        }
        let url = reqwest::Url::parse(&self.endpoint_url)
            .map_err(|e| ConfigError::Invalid(format!("endpoint URL '{}': {e}", self.endpoint_url)))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(ConfigError::Invalid(format!(
                "endpoint URL scheme '{}' is not http(s)",
                url.scheme()
            )));
        }
        if self.device_token.trim().is_empty() {
            return Err(ConfigError::Invalid("device token is not set".into()));
        }
        Ok(())
    }

    /// Aggregation period in scheduler ticks, saturating at the tick width.
    pub fn period_millis(&self) -> Millis {
        Millis::try_from(self.period.as_millis()).unwrap_or(Millis::MAX)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn tls_policy(&self) -> TlsPolicy {
        TlsPolicy::from_verify_flag(self.tls_verify)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            timeout: self.request_timeout,
            tls: self.tls_policy(),
            user_agent: default_user_agent(),
        }
    }

    /// Copy safe to print: the token is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.device_token.is_empty() {
            copy.device_token = "********".to_string();
        }
        copy
    }
}

/// Where pulses come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub source: SourceKind,
    /// File or FIFO carrying gpiomon output; stdin when absent
    pub path: Option<PathBuf>,
    /// GPIO line offset the tube is wired to
    pub pin: u32,
    /// Qualifying edge direction
    pub edge: Edge,
    /// Rate for the simulated source
    pub simulated_cpm: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Gpiomon,
            path: None,
            pin: 14,
            edge: Edge::Falling,
            simulated_cpm: 30,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
