//! API request handlers: session lifecycle and the public query surface.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::base64_encode;
use crate::config::ObserverConfig;
use crate::core::registry::Registry;
use crate::error::ObserverError;
use crate::s7::TcpS7Client;

/// API error response (RFC 7807 problem+json format)
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// A short, human-readable summary of the problem type
    pub title: String,

    /// The HTTP status code
    pub status: u16,

    /// A human-readable explanation specific to this occurrence
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, detail: String) -> Self {
        Self { title: status.canonical_reason().unwrap_or("Error").to_string(), status: status.as_u16(), detail }
    }
}

impl From<ObserverError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: ObserverError) -> Self {
        let status = match err {
            ObserverError::Validation(_) => StatusCode::BAD_REQUEST,
            ObserverError::NoSession => StatusCode::CONFLICT,
            ObserverError::NotFound(_) => StatusCode::NOT_FOUND,
            ObserverError::Transport(_) | ObserverError::EmptyRead => StatusCode::BAD_GATEWAY,
        };
        (status, Json(ErrorResponse::new(status, err.to_string())))
    }
}

/// API success response
#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse)),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

/// Get observer configuration
#[utoipa::path(
    get,
    path = "/api/v1/config",
    responses((status = 200, description = "Configuration retrieved", body = ObserverConfig)),
    tag = "config"
)]
pub async fn get_config(State(registry): State<Arc<Registry>>) -> Json<ObserverConfig> {
    Json(registry.config().clone())
}

/// Session start request body: PLC address and connection parameters.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SessionStartRequest {
    /// Dotted-quad IPv4 address of the S7 controller
    pub plc_address: String,
    /// S7 rack number (TSAP addressing)
    #[serde(default)]
    pub rack: u16,
    /// S7 slot number (TSAP addressing)
    pub slot_nr: u16,
    /// Inter-sample delay, milliseconds. Falls back to the configured default.
    pub period: Option<u64>,
}

/// Session status response.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatusResponse {
    pub connected: bool,
}

fn validate_address(address: &str) -> Result<(), ObserverError> {
    let octets: Vec<&str> = address.split('.').collect();
    if octets.len() != 4 || !octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        return Err(ObserverError::Validation(format!("invalid dotted-quad IPv4 address: {address}")));
    }
    Ok(())
}

/// Start a sampling session against a PLC.
#[utoipa::path(
    post,
    path = "/api/v1/session/start",
    request_body = SessionStartRequest,
    responses(
        (status = 200, description = "Session started", body = SuccessResponse),
        (status = 400, description = "Invalid session parameters", body = ErrorResponse),
        (status = 409, description = "A session is already active", body = ErrorResponse)
    ),
    tag = "session"
)]
pub async fn session_start(
    State(registry): State<Arc<Registry>>,
    Json(req): Json<SessionStartRequest>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    validate_address(&req.plc_address)?;

    let period_ms = req.period.unwrap_or(registry.config().default_sample_period_ms);
    if period_ms == 0 {
        return Err(ObserverError::Validation("period must be > 0".into()).into());
    }

    let timeout = std::time::Duration::from_millis(registry.config().transport_timeout_ms);
    let client = Box::new(TcpS7Client::new(timeout));

    registry
        .connect(client, req.plc_address, req.rack, req.slot_nr, period_ms)
        .await
        .map(|_| Json(SuccessResponse { message: "session started".to_string() }))
        .map_err(Into::into)
}

/// Stop the active sampling session, if any.
#[utoipa::path(
    post,
    path = "/api/v1/session/stop",
    responses((status = 200, description = "Session stopped", body = SuccessResponse)),
    tag = "session"
)]
pub async fn session_stop(State(registry): State<Arc<Registry>>) -> Json<SuccessResponse> {
    registry.disconnect().await;
    Json(SuccessResponse { message: "session stopped".to_string() })
}

/// Connection status of the current session.
#[utoipa::path(
    get,
    path = "/api/v1/session/status",
    responses((status = 200, description = "Session status", body = SessionStatusResponse)),
    tag = "session"
)]
pub async fn session_status(State(registry): State<Arc<Registry>>) -> Json<SessionStatusResponse> {
    Json(SessionStatusResponse { connected: registry.is_connected() })
}

/// A single de-duplicated machine state, base64-encoded masked image.
#[derive(Debug, Serialize, ToSchema)]
pub struct StateEntry {
    pub id: usize,
    pub masked_image: String,
    pub count: u64,
}

/// A single observed transition between two states.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionEntry {
    pub src: usize,
    pub dst: usize,
    pub duration_ms: u64,
}

/// `get_statistics()`: states, per-state counts, and the transition graph.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatisticsResponse {
    pub states: Vec<StateEntry>,
    pub transitions: Vec<TransitionEntry>,
}

/// Snapshot of inferred states and transitions.
#[utoipa::path(
    get,
    path = "/api/v1/statistics",
    responses((status = 200, description = "States and transitions", body = StatisticsResponse)),
    tag = "analysis"
)]
pub async fn get_statistics(State(registry): State<Arc<Registry>>) -> Json<StatisticsResponse> {
    let result = registry
        .with_session(|session| {
            let states = session.states();
            let entries: Vec<StateEntry> = (0..states.len())
                .map(|id| StateEntry {
                    id,
                    masked_image: base64_encode(states.state_at(id).unwrap()),
                    count: states.count_at(id),
                })
                .collect();
            let transitions = session
                .transitions()
                .iter()
                .map(|t| TransitionEntry { src: t.src, dst: t.dst, duration_ms: t.duration_ms })
                .collect();
            StatisticsResponse { states: entries, transitions }
        })
        .await;

    Json(result.unwrap_or(StatisticsResponse { states: Vec::new(), transitions: Vec::new() }))
}

/// The structural mask, base64-encoded, if one has been frozen yet.
#[derive(Debug, Serialize, ToSchema)]
pub struct MaskResponse {
    pub mask: Option<String>,
}

/// `get_mask()`: the frozen structural mask, if any.
#[utoipa::path(
    get,
    path = "/api/v1/mask",
    responses((status = 200, description = "Structural mask", body = MaskResponse)),
    tag = "analysis"
)]
pub async fn get_mask(State(registry): State<Arc<Registry>>) -> Json<MaskResponse> {
    let mask = registry.with_session(|s| s.mask().map(base64_encode)).await.flatten();
    Json(MaskResponse { mask })
}

/// `get_cycles()`: accepted cycle durations in milliseconds.
#[derive(Debug, Serialize, ToSchema)]
pub struct CyclesResponse {
    pub cycles_ms: Vec<u64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/cycles",
    responses((status = 200, description = "Accepted cycle durations", body = CyclesResponse)),
    tag = "analysis"
)]
pub async fn get_cycles(State(registry): State<Arc<Registry>>) -> Json<CyclesResponse> {
    let cycles = registry.with_session(|s| s.cycles().to_vec()).await.unwrap_or_default();
    Json(CyclesResponse { cycles_ms: cycles })
}

/// `get_latest_sample()`: the most recent `(timestamp, image)` pair, base64-encoded.
#[derive(Debug, Serialize, ToSchema)]
pub struct LatestSampleResponse {
    pub timestamp_ns: Option<u64>,
    pub image: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/sample/latest",
    responses((status = 200, description = "Latest sample", body = LatestSampleResponse)),
    tag = "analysis"
)]
pub async fn get_latest_sample(State(registry): State<Arc<Registry>>) -> Json<LatestSampleResponse> {
    let sample = registry.with_session(|s| s.latest_sample().copied()).await.flatten();
    Json(LatestSampleResponse {
        timestamp_ns: sample.map(|s| s.timestamp_ns),
        image: sample.map(|s| base64_encode(&s.image)),
    })
}

/// `get_value_histogram()`: per-offset value-frequency matrix, one
/// base64-encoded row per observed value `0..256`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistogramResponse {
    pub rows: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/histogram",
    responses((status = 200, description = "Value-frequency histogram", body = HistogramResponse)),
    tag = "analysis"
)]
pub async fn get_histogram(State(registry): State<Arc<Registry>>) -> Json<HistogramResponse> {
    let rows = registry
        .with_session(|s| s.histogram_snapshot().iter().map(base64_encode).collect())
        .await
        .unwrap_or_default();
    Json(HistogramResponse { rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_dotted_quad() {
        assert!(validate_address("192.168.0.1").is_ok());
        assert!(validate_address("not-an-ip").is_err());
        assert!(validate_address("1.2.3").is_err());
        assert!(validate_address("1.2.3.4.5").is_err());
    }
}
