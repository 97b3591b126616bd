//! HTTPS transport to the ingestion endpoint.
//!
//! Wraps an async `reqwest` client in a private current-thread runtime so the
//! single-threaded scheduler loop can make a blocking, timeout-bounded call.

use crate::reporter::{IngestRequest, IngestResponse, Transport};
use std::time::Duration;

/// Certificate validation policy for the ingestion connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Validate the server certificate chain and hostname
    #[default]
    Verify,
    /// Accept any certificate. Anyone on the path can impersonate the endpoint
    /// and read the device token.
    AcceptInvalidCerts,
}

impl TlsPolicy {
    pub fn from_verify_flag(verify: bool) -> Self {
        if verify {
            TlsPolicy::Verify
        } else {
            TlsPolicy::AcceptInvalidCerts
        }
    }
}

/// Settings for building an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Upper bound on one request, connect through body
    pub timeout: Duration,
    pub tls: TlsPolicy,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            tls: TlsPolicy::Verify,
            user_agent: default_user_agent(),
        }
    }
}

/// User agent naming the crate version and host.
pub fn default_user_agent() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("geiger-sensor-agent/{} ({host})", env!("CARGO_PKG_VERSION"))
}

/// Failures that leave the reporter without a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
    #[error("transport setup failed: {0}")]
    Setup(String),
    #[error("reporting disabled: {0}")]
    Disabled(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(error_chain(&e))
        } else {
            TransportError::Request(error_chain(&e))
        }
    }
}

/// reqwest hides DNS and TLS causes in the source chain.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Blocking HTTPS transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Setup(format!("Failed to create runtime: {e}")))?;

        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .user_agent(options.user_agent.clone());

        if options.tls == TlsPolicy::AcceptInvalidCerts {
            tracing::warn!(
                "TLS certificate verification is DISABLED for the ingestion endpoint; \
                 the device token can be intercepted by anyone on the network path"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Setup(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, runtime })
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: &IngestRequest) -> Result<IngestResponse, TransportError> {
        self.runtime.block_on(async {
            let mut builder = self.client.post(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(*name, value);
            }

            let response = builder.body(request.body.clone()).send().await?;
            let status = response.status().as_u16();

            // A status was obtained; a broken body does not change the class.
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!("Could not read response body: {e}");
                    String::new()
                }
            };

            Ok(IngestResponse { status, body })
        })
    }
}

/// Stand-in used when configuration prevents reporting. Counting continues;
/// every report attempt becomes a transport failure naming the cause.
#[derive(Debug, Clone)]
pub struct DisabledTransport {
    reason: String,
}

impl DisabledTransport {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Transport for DisabledTransport {
    fn post(&self, _request: &IngestRequest) -> Result<IngestResponse, TransportError> {
        Err(TransportError::Disabled(self.reason.clone()))
    }
}
