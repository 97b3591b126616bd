//! Wire payload sent to the ingestion endpoint.
//!
//! The body is a compact JSON object:
//!
//! ```json
//! {"clicks": 42, "ts": 123456}
//! ```
//!
//! `ts` is in milliseconds. Its meaning depends on the deployment's
//! [`TimestampMode`]: device uptime, or Unix epoch time when the wall clock is
//! synchronized. The backend treats values below 1e12 as "not wall-clock" and
//! substitutes its receive time.

use crate::core::clock::Clock;
use crate::core::counter::PulseCount;
use crate::core::window::WindowSnapshot;
use serde::{Deserialize, Serialize};

/// What the payload's `ts` field means for this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Milliseconds since the node started
    #[default]
    Uptime,
    /// Milliseconds since the Unix epoch
    Epoch,
}

impl std::fmt::Display for TimestampMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampMode::Uptime => write!(f, "uptime"),
            TimestampMode::Epoch => write!(f, "epoch"),
        }
    }
}

impl std::str::FromStr for TimestampMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uptime" => Ok(TimestampMode::Uptime),
            "epoch" => Ok(TimestampMode::Epoch),
            other => Err(format!("unknown timestamp mode '{other}'")),
        }
    }
}

/// Resolved timestamp and the semantics actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub ms: u64,
    pub mode: TimestampMode,
}

impl Timestamp {
    /// Read a timestamp from the clock. Epoch mode falls back to uptime when
    /// the wall clock is not synchronized.
    pub fn now(clock: &dyn Clock, mode: TimestampMode) -> Self {
        match mode {
            TimestampMode::Epoch => match clock.epoch_ms() {
                Some(ms) => Self {
                    ms,
                    mode: TimestampMode::Epoch,
                },
                None => Self {
                    ms: clock.uptime_ms(),
                    mode: TimestampMode::Uptime,
                },
            },
            TimestampMode::Uptime => Self {
                ms: clock.uptime_ms(),
                mode: TimestampMode::Uptime,
            },
        }
    }
}

/// The request body for one report attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Pulse count for the window
    pub clicks: PulseCount,
    /// Milliseconds, semantics per deployment
    pub ts: u64,
}

impl TelemetryPayload {
    pub fn new(snapshot: &WindowSnapshot, timestamp: Timestamp) -> Self {
        Self {
            clicks: snapshot.count,
            ts: timestamp.ms,
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a wire body.
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use std::time::Duration;

    fn snapshot(count: PulseCount) -> WindowSnapshot {
        WindowSnapshot {
            index: 0,
            count,
            window_duration: Duration::from_secs(10),
            captured_at: 10_000,
        }
    }

    #[test]
    fn test_zero_count_round_trip() {
        let payload = TelemetryPayload::new(
            &snapshot(0),
            Timestamp {
                ms: 10_003,
                mode: TimestampMode::Uptime,
            },
        );
        let body = payload.encode().unwrap();
        assert_eq!(body, r#"{"clicks":0,"ts":10003}"#);

        let decoded = TelemetryPayload::decode(&body).unwrap();
        assert_eq!(decoded.clicks, 0);
        assert_eq!(decoded.ts, 10_003);
    }

    #[test]
    fn test_epoch_mode_uses_wall_clock() {
        let clock = ManualClock::with_epoch(500, 1_700_000_000_000);
        let ts = Timestamp::now(&clock, TimestampMode::Epoch);
        assert_eq!(ts.mode, TimestampMode::Epoch);
        assert_eq!(ts.ms, 1_700_000_000_500);
    }

    #[test]
    fn test_epoch_mode_falls_back_without_sync() {
        let clock = ManualClock::new(500);
        let ts = Timestamp::now(&clock, TimestampMode::Epoch);
        assert_eq!(ts.mode, TimestampMode::Uptime);
        assert_eq!(ts.ms, 500);
    }

    #[test]
    fn test_timestamp_mode_parsing() {
        assert_eq!("Epoch".parse::<TimestampMode>(), Ok(TimestampMode::Epoch));
        assert_eq!("uptime".parse::<TimestampMode>(), Ok(TimestampMode::Uptime));
        assert!("wall".parse::<TimestampMode>().is_err());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        assert!(TelemetryPayload::decode(r#"{"clicks":3}"#).is_err());
    }
}
