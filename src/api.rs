// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::ingest::types::Source;
use crate::job::{JobStatus, JobTracker, StartCode, StartOutcome};
use crate::store::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub tracker: Arc<JobTracker>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/news", get(list_news))
        .route("/api/news/today", get(today_news))
        .route("/api/news/collect", post(start_collect))
        .route("/api/news/collect/status", get(collect_status))
        .route("/api/news/{id}", get(get_news))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Any storage failure surfaces as a 500 with `{"error": ...}`.
struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %format!("{:#}", self.0), "api request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "time": Utc::now().to_rfc3339() }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    source: Option<String>,
}

async fn list_news(
    State(state): State<AppState>,
    Query(q): Query<ListParams>,
) -> Result<Response, ApiError> {
    let source = match q.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(s) => match Source::parse(s) {
            Some(src) => Some(src),
            None => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("unknown source: {s}") })),
                )
                    .into_response())
            }
        },
    };
    let page = state
        .store
        .list(q.page.unwrap_or(1), q.limit.unwrap_or(10), source)
        .await?;
    Ok(Json(page).into_response())
}

async fn today_news(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let items = state.store.collected_today().await?;
    let total = items.len();
    Ok(Json(json!({ "items": items, "total": total })))
}

async fn get_news(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    Ok(match state.store.get(id).await? {
        Some(item) => Json(item).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response(),
    })
}

async fn start_collect(State(state): State<AppState>) -> (StatusCode, Json<StartOutcome>) {
    let outcome = state.tracker.start();
    let code = match outcome.code {
        StartCode::Started => StatusCode::ACCEPTED,
        StartCode::AlreadyRunning => StatusCode::OK,
        StartCode::AlreadyCollectedToday => StatusCode::CONFLICT,
    };
    (code, Json(outcome))
}

async fn collect_status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.tracker.status())
}
