//! API routing

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::{handlers, middleware, ws};
use crate::core::registry::Registry;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_config,
        handlers::session_start,
        handlers::session_stop,
        handlers::session_status,
        handlers::get_statistics,
        handlers::get_mask,
        handlers::get_cycles,
        handlers::get_latest_sample,
        handlers::get_histogram,
    ),
    components(
        schemas(
            crate::config::ObserverConfig,
            handlers::ErrorResponse,
            handlers::SuccessResponse,
            handlers::HealthResponse,
            handlers::SessionStartRequest,
            handlers::SessionStatusResponse,
            handlers::StateEntry,
            handlers::TransitionEntry,
            handlers::StatisticsResponse,
            handlers::MaskResponse,
            handlers::CyclesResponse,
            handlers::LatestSampleResponse,
            handlers::HistogramResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "config", description = "Observer configuration"),
        (name = "session", description = "Sampling session lifecycle"),
        (name = "analysis", description = "Inferred cycles, states, transitions and raw samples"),
    ),
    info(
        title = "S7 I/O Image Observer",
        version = "0.1.0",
        description = "Samples a Siemens S7 controller's I/O image and infers cycle time, states, and transitions",
    )
)]
struct ApiDoc;

/// Create the API router
pub fn create_router(registry: Arc<Registry>) -> Router {
    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/config", get(handlers::get_config))
        .route("/api/v1/session/start", post(handlers::session_start))
        .route("/api/v1/session/stop", post(handlers::session_stop))
        .route("/api/v1/session/status", get(handlers::session_status))
        .route("/api/v1/statistics", get(handlers::get_statistics))
        .route("/api/v1/mask", get(handlers::get_mask))
        .route("/api/v1/cycles", get(handlers::get_cycles))
        .route("/api/v1/sample/latest", get(handlers::get_latest_sample))
        .route("/api/v1/histogram", get(handlers::get_histogram))
        .route("/events", get(ws::events_handler))
        .with_state(registry)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(CorsLayer::permissive())
}
