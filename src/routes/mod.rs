//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

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
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/topics", get(http::http_list_topics))
        .route("/api/v1/topics/:topic_id/problems", get(http::http_topic_problems))
        .route("/api/v1/attempts", post(http::http_post_attempt))
        .route("/api/v1/practice/next", get(http::http_next_practice))
        .route("/api/v1/mastery", get(http::http_get_mastery))
        .route("/api/v1/progress", get(http::http_get_progress))
        .route("/api/v1/sessions", post(http::http_open_session))
        .route("/api/v1/sessions/:session_id", get(http::http_get_session))
        .route("/api/v1/sessions/:session_id/turns", post(http::http_post_turn))
        .route("/api/v1/sessions/:session_id/end", post(http::http_end_session))
        .route("/api/v1/assist", post(http::http_post_assist))
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
