//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{delete, get, post},
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
/// - session, style and validation endpoints under `/api/v1/...`
/// - template cache diagnostics under `/api/v1/templates/...`
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/api/v1/health", get(http::http_health))
    .route("/api/v1/sessions", post(http::http_post_session))
    .route("/api/v1/sessions/:session_id", delete(http::http_delete_session))
    .route("/api/v1/sessions/:session_id/distribution", get(http::http_get_distribution))
    .route("/api/v1/sessions/:session_id/health", get(http::http_get_health_score))
    .route("/api/v1/sessions/:session_id/counts/:objective_id", get(http::http_get_counts))
    .route("/api/v1/style/next", post(http::http_post_next_style))
    .route("/api/v1/style/record", post(http::http_post_record))
    .route("/api/v1/validate", post(http::http_post_validate))
    .route("/api/v1/templates", delete(http::http_delete_templates))
    .route("/api/v1/templates/metrics", get(http::http_get_template_metrics))
    .route("/api/v1/templates/tree/:exam_id", get(http::http_get_inheritance_tree))
    .route("/api/v1/templates/preload/:exam_id", post(http::http_post_preload))
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
