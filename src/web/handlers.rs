//! HTTP request handlers.

use super::AppState;
use crate::config::load_endpoints;
use crate::query::{compute_all_stats, query, FilterState, PageRequest, DEFAULT_PAGE_SIZE};

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// API: Logs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

pub async fn handle_get_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsQuery>,
) -> impl IntoResponse {
    let filter = match params.filter.as_deref() {
        Some(raw) => match raw.parse::<FilterState>() {
            Ok(f) => f,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        },
        None => FilterState::All,
    };

    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(state.store.capacity());
    let page = PageRequest::new(params.page.unwrap_or(1), page_size);

    let snapshot = state.store.load_all();
    Json(query(&snapshot, filter, page)).into_response()
}

pub async fn handle_export_logs(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.load_all();
    let body = match serde_json::to_vec_pretty(snapshot.as_slice()) {
        Ok(b) => b,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let disposition = format!(
        "attachment; filename=\"ping-logs-{}.json\"",
        Utc::now().format("%Y-%m-%d")
    );

    (
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

// ============================================================================
// API: Endpoints
// ============================================================================

pub async fn handle_get_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = load_endpoints(&state.config.config_path).unwrap_or_else(|e| {
        tracing::warn!("Serving empty endpoint list: {}", e);
        Vec::new()
    });

    let snapshot = state.store.load_all();
    Json(compute_all_stats(&snapshot, &endpoints))
}

// ============================================================================
// API: Status
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub entries: usize,
    pub capacity: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub unflushed: bool,
    pub interval_secs: u64,
    pub success_policy: String,
}

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.load_all();

    Json(StatusResponse {
        entries: snapshot.len(),
        capacity: state.store.capacity(),
        last_updated: snapshot.last().map(|r| r.timestamp),
        unflushed: state.store.is_dirty(),
        interval_secs: state.config.interval.as_secs(),
        success_policy: state.config.success_policy.to_string(),
    })
}
