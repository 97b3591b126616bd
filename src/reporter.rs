//! Telemetry reporter: turns a window snapshot into one authenticated POST.
//!
//! The reporter owns payload construction, headers and outcome
//! classification. Moving bytes over the network is delegated to a
//! [`Transport`], so the same reporter runs against the HTTPS client in
//! production and against recording fakes in tests.

use crate::core::clock::Clock;
use crate::core::payload::{TelemetryPayload, Timestamp, TimestampMode};
use crate::core::window::WindowSnapshot;
use crate::transport::TransportError;
use std::sync::Arc;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A single POST to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl IngestRequest {
    /// Look up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Whatever came back once a status code was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestResponse {
    pub status: u16,
    pub body: String,
}

/// Delivers a request and returns the response, or fails without one.
pub trait Transport {
    fn post(&self, request: &IngestRequest) -> Result<IngestResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn post(&self, request: &IngestRequest) -> Result<IngestResponse, TransportError> {
        (**self).post(request)
    }
}

/// Result of one report attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A 2xx response was received
    Success { status: u16, body: String },
    /// No response was obtained (offline, DNS, TLS, timeout)
    TransportFailure { reason: String },
    /// A non-2xx response was received
    ProtocolFailure { status: u16, body: String },
}

impl DeliveryOutcome {
    /// Classify a received response by its status code.
    pub fn from_response(response: IngestResponse) -> Self {
        if (200..300).contains(&response.status) {
            DeliveryOutcome::Success {
                status: response.status,
                body: response.body,
            }
        } else {
            DeliveryOutcome::ProtocolFailure {
                status: response.status,
                body: response.body,
            }
        }
    }

    /// True when the endpoint answered at all, regardless of status.
    pub fn response_received(&self) -> bool {
        !matches!(self, DeliveryOutcome::TransportFailure { .. })
    }

    /// True only for a 2xx answer.
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryOutcome::Success { status, .. }
            | DeliveryOutcome::ProtocolFailure { status, .. } => Some(*status),
            DeliveryOutcome::TransportFailure { .. } => None,
        }
    }

    /// Short label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success { .. } => "success",
            DeliveryOutcome::TransportFailure { .. } => "transport_failure",
            DeliveryOutcome::ProtocolFailure { .. } => "protocol_failure",
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Success { status, body } => write!(f, "POST => {status} {body}"),
            DeliveryOutcome::TransportFailure { reason } => write!(f, "POST failed: {reason}"),
            DeliveryOutcome::ProtocolFailure { status, body } => {
                write!(f, "POST => {status} (rejected) {body}")
            }
        }
    }
}

/// Builds and delivers telemetry payloads.
pub struct TelemetryReporter<T: Transport> {
    transport: T,
    endpoint: String,
    token: String,
    timestamp_mode: TimestampMode,
    clock: Arc<dyn Clock>,
    warned_epoch_fallback: bool,
}

impl<T: Transport> TelemetryReporter<T> {
    pub fn new(
        transport: T,
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timestamp_mode: TimestampMode,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            token: token.into(),
            timestamp_mode,
            clock,
            warned_epoch_fallback: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the payload for a snapshot, stamped with the current time.
    pub fn build_payload(&mut self, snapshot: &WindowSnapshot) -> TelemetryPayload {
        let timestamp = Timestamp::now(self.clock.as_ref(), self.timestamp_mode);
        if timestamp.mode != self.timestamp_mode && !self.warned_epoch_fallback {
            tracing::warn!(
                "Wall clock not synchronized; reporting uptime milliseconds until it is"
            );
            self.warned_epoch_fallback = true;
        }
        TelemetryPayload::new(snapshot, timestamp)
    }

    /// Build the full request for a snapshot.
    pub fn build_request(&mut self, snapshot: &WindowSnapshot) -> Result<IngestRequest, serde_json::Error> {
        let body = self.build_payload(snapshot).encode()?;
        Ok(IngestRequest {
            url: self.endpoint.clone(),
            headers: vec![
                (CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE.to_string()),
                (AUTHORIZATION_HEADER, format!("Bearer {}", self.token)),
            ],
            body,
        })
    }

    /// Deliver one snapshot and classify the result. Never retries.
    pub fn report(&mut self, snapshot: WindowSnapshot) -> DeliveryOutcome {
        let request = match self.build_request(&snapshot) {
            Ok(request) => request,
            Err(e) => {
                return DeliveryOutcome::TransportFailure {
                    reason: format!("payload encoding failed: {e}"),
                }
            }
        };

        tracing::debug!(window = snapshot.index, body = %request.body, "Posting telemetry");

        match self.transport.post(&request) {
            Ok(response) => DeliveryOutcome::from_response(response),
            Err(e) => DeliveryOutcome::TransportFailure {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use std::cell::RefCell;
    use std::time::Duration;

    struct FixedTransport {
        result: Result<IngestResponse, TransportError>,
        seen: RefCell<Vec<IngestRequest>>,
    }

    impl FixedTransport {
        fn answering(status: u16, body: &str) -> Self {
            Self {
                result: Ok(IngestResponse {
                    status,
                    body: body.to_string(),
                }),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(error: TransportError) -> Self {
            Self {
                result: Err(error),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for FixedTransport {
        fn post(&self, request: &IngestRequest) -> Result<IngestResponse, TransportError> {
            self.seen.borrow_mut().push(request.clone());
            self.result.clone()
        }
    }

    fn reporter(transport: FixedTransport) -> TelemetryReporter<FixedTransport> {
        TelemetryReporter::new(
            transport,
            "https://rad.example.dev/ingest",
            "device-secret",
            TimestampMode::Uptime,
            Arc::new(ManualClock::new(10_003)),
        )
    }

    fn snapshot(count: u32) -> WindowSnapshot {
        WindowSnapshot {
            index: 4,
            count,
            window_duration: Duration::from_secs(10),
            captured_at: 10_000,
        }
    }

    #[test]
    fn test_request_headers_and_body() {
        let mut reporter = reporter(FixedTransport::answering(200, "OK"));
        let request = reporter.build_request(&snapshot(12)).unwrap();

        assert_eq!(request.url, "https://rad.example.dev/ingest");
        assert_eq!(request.header("authorization"), Some("Bearer device-secret"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));

        let payload = TelemetryPayload::decode(&request.body).unwrap();
        assert_eq!(payload.clicks, 12);
        assert_eq!(payload.ts, 10_003);
    }

    #[test]
    fn test_zero_count_is_still_sent() {
        let mut reporter = reporter(FixedTransport::answering(200, "OK"));
        let outcome = reporter.report(snapshot(0));

        assert!(outcome.is_success());
        let seen = reporter.transport().seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(TelemetryPayload::decode(&seen[0].body).unwrap().clicks, 0);
    }

    #[test]
    fn test_non_2xx_is_protocol_failure_with_response() {
        let mut reporter = reporter(FixedTransport::answering(401, "Unauthorized"));
        let outcome = reporter.report(snapshot(3));

        assert_eq!(
            outcome,
            DeliveryOutcome::ProtocolFailure {
                status: 401,
                body: "Unauthorized".to_string()
            }
        );
        assert!(outcome.response_received());
        assert!(!outcome.is_success());
        assert_eq!(outcome.status(), Some(401));
    }

    #[test]
    fn test_transport_error_is_transport_failure() {
        let mut reporter = reporter(FixedTransport::failing(TransportError::Timeout));
        let outcome = reporter.report(snapshot(3));

        assert!(matches!(outcome, DeliveryOutcome::TransportFailure { .. }));
        assert!(!outcome.response_received());
        assert_eq!(outcome.status(), None);
        assert_eq!(outcome.label(), "transport_failure");
    }

    #[test]
    fn test_outcome_display() {
        let outcome = DeliveryOutcome::Success {
            status: 200,
            body: "OK".to_string(),
        };
        assert_eq!(format!("{outcome}"), "POST => 200 OK");
    }
}
