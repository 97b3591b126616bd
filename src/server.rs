//! In-memory ingestion sink for bench testing a node.
//!
//! Speaks the same contract as the production ingestion endpoint:
//! - `POST /ingest` with `Authorization: Bearer <token>` and a
//!   `{"clicks": .., "ts": ..}` body
//! - `GET /latest` for the most recent reading
//! - `GET /history?window=1hr` for readings received in a recent span
//! - `GET /health`
//!
//! Readings live in memory only and are capped; nothing is interpreted
//! beyond the raw count.
//!
//! # Architecture
//!
//! ```text
//! geiger-sensor ──→ POST /ingest ──→ sink ──→ GET /latest, /history
//! ```

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Timestamps at or below this are device uptime, not wall-clock time.
const WALL_CLOCK_THRESHOLD_MS: u64 = 1_000_000_000_000;

/// A node is shown offline after this long without a reading.
const OFFLINE_AFTER_MS: u64 = 600_000;

/// Readings kept in memory.
const HISTORY_CAPACITY: usize = 10_000;

/// Sink configuration
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Address to bind to
    pub bind: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Bearer token devices must present
    pub token: String,
}

impl SinkConfig {
    /// Loopback sink on the given port.
    pub fn new(port: u16, token: impl Into<String>) -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            token: token.into(),
        }
    }

    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }
}

/// One accepted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub clicks: u64,
    /// Device timestamp if it was wall-clock, otherwise receive time
    pub ts: u64,
    pub received_at: u64,
}

/// Shared sink state
pub struct SinkState {
    token: String,
    readings: RwLock<VecDeque<Reading>>,
}

impl SinkState {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            readings: RwLock::new(VecDeque::new()),
        }
    }

    async fn push(&self, reading: Reading) {
        let mut readings = self.readings.write().await;
        if readings.len() == HISTORY_CAPACITY {
            readings.pop_front();
        }
        readings.push_back(reading);
    }
}

/// Report body. Missing fields fall back the way the endpoint does.
#[derive(Debug, Deserialize)]
struct IngestBody {
    #[serde(default)]
    clicks: Option<u64>,
    #[serde(default)]
    ts: Option<u64>,
}

/// Response from the latest endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestResponse {
    pub latest: Option<Reading>,
    pub offline: bool,
    pub last_seen_ago_ms: Option<u64>,
}

/// Response from the history endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub data: Vec<Reading>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    window: Option<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Span covered by a named history window; unknown names mean one hour.
fn window_span_ms(name: &str) -> u64 {
    const HOUR: u64 = 3_600_000;
    const DAY: u64 = 24 * HOUR;
    match name {
        "10hr" => 10 * HOUR,
        "10day" => 10 * DAY,
        "50day" => 50 * DAY,
        _ => HOUR,
    }
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /ingest
async fn ingest(
    State(state): State<Arc<SinkState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    let expected = format!("Bearer {}", state.token);
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if presented != expected {
        return (StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let body: IngestBody = match serde_json::from_str(&body) {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!("Rejecting report body: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let received_at = now_ms();
    let ts = body
        .ts
        .filter(|ts| *ts > WALL_CLOCK_THRESHOLD_MS)
        .unwrap_or(received_at);
    let reading = Reading {
        clicks: body.clicks.unwrap_or(0),
        ts,
        received_at,
    };

    tracing::info!(clicks = reading.clicks, ts = reading.ts, "Reading ingested");
    state.push(reading).await;

    (StatusCode::OK, "OK")
}

/// GET /latest
async fn latest(State(state): State<Arc<SinkState>>) -> Json<LatestResponse> {
    let latest = state.readings.read().await.back().copied();
    let last_seen_ago_ms = latest.map(|r| now_ms().saturating_sub(r.received_at));

    Json(LatestResponse {
        latest,
        offline: last_seen_ago_ms.map_or(true, |ago| ago > OFFLINE_AFTER_MS),
        last_seen_ago_ms,
    })
}

/// GET /history
async fn history(
    State(state): State<Arc<SinkState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let span = window_span_ms(query.window.as_deref().unwrap_or("1hr"));
    let since = now_ms().saturating_sub(span);

    let data = state
        .readings
        .read()
        .await
        .iter()
        .filter(|r| r.ts >= since)
        .copied()
        .collect();

    Json(HistoryResponse { data })
}

/// Build the sink router.
pub fn router(state: Arc<SinkState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/latest", get(latest))
        .route("/history", get(history))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the sink
pub async fn run(config: SinkConfig) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(SinkState::new(config.token.clone()));
    let app = router(state);

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Ingestion sink listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Sink shutdown signal received");
            })
            .await
        {
            tracing::error!("Sink error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_spans() {
        assert_eq!(window_span_ms("1hr"), 3_600_000);
        assert_eq!(window_span_ms("10day"), 864_000_000);
        assert_eq!(window_span_ms("bogus"), 3_600_000);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let state = SinkState::new("t");
        for i in 0..(HISTORY_CAPACITY as u64 + 5) {
            state
                .push(Reading {
                    clicks: i,
                    ts: i,
                    received_at: i,
                })
                .await;
        }
        let readings = state.readings.read().await;
        assert_eq!(readings.len(), HISTORY_CAPACITY);
        assert_eq!(readings.front().map(|r| r.clicks), Some(5));
    }
}
