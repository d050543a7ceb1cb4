//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/students", post(http::http_register_student))
        .route("/api/v1/students/:id", get(http::http_get_student))
        .route("/api/v1/students/:id/recommendations", get(http::http_get_recommendations))
        .route("/api/v1/students/:id/reinforce", get(http::http_get_reinforce))
        .route("/api/v1/assessments", post(http::http_create_assessment))
        .route("/api/v1/assessments/:id", get(http::http_get_assessment))
        .route("/api/v1/assessments/:id/submit", post(http::http_submit_assessment))
        .route("/api/v1/evaluate", post(http::http_evaluate))
        .route("/api/v1/resources", get(http::http_get_resources).post(http::http_add_resource))
        .route("/api/v1/resources/:id", get(http::http_get_resource))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
