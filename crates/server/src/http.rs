//! Admin HTTP surface: liveness/readiness, Prometheus metrics, and
//! read-only session introspection (spec §6.4). No auth — this surface is
//! meant to sit behind an operator-only network boundary, not the public
//! client path.

use crate::state::AppState;
use crate::websocket;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use voice_agent_core::SessionId;

pub fn create_router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/ws", get(websocket::upgrade))
        .layer(cors_layer(cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<_> = allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness is just liveness here: the server holds no external
/// connection pool that can be independently down while the process is up.
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let _ = state.registry.count();
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    session_id: String,
    state: String,
    age_ms: u64,
    idle_ms: u64,
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let summaries: Vec<SessionSummary> = state
        .registry
        .all_ids()
        .into_iter()
        .filter_map(|id| state.registry.get(id).map(|meta| (id, meta)))
        .map(|(id, meta)| {
            let meta = meta.read();
            SessionSummary {
                session_id: id.to_string(),
                state: format!("{:?}", meta.state),
                age_ms: meta.age_ms(),
                idle_ms: meta.idle_ms(),
            }
        })
        .collect();
    Json(summaries)
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(session_id) = id.parse::<SessionId>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(meta) = state.registry.get(session_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let meta = meta.read();
    Json(SessionSummary {
        session_id: id,
        state: format!("{:?}", meta.state),
        age_ms: meta.age_ms(),
        idle_ms: meta.idle_ms(),
    })
    .into_response()
}
