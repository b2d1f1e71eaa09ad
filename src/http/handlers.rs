//! HTTP API Request Handlers
//!
//! Thin translation between HTTP and the dashboard surface: extract the
//! request, call the matching `Dashboard` method, pick a status code from
//! the structured result. No business logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::debug;

use crate::service::Dashboard;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

#[derive(Debug, Deserialize)]
pub struct StartJobRequest {
    #[serde(default = "default_job_type")]
    pub job_type: String,
    pub urls: Vec<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

fn default_job_type() -> String {
    "scrape".to_string()
}

#[derive(Debug, Deserialize)]
pub struct JobDataQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_data_limit")]
    pub limit: u64,
}

fn default_data_limit() -> u64 {
    10
}

/// Liveness probe of the remote scraping service
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.health().await)
}

/// Liveness plus synthetic-scrape capability check
pub async fn full_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.full_health().await)
}

/// Bucketed queue store snapshot
pub async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.get_queue_status().await)
}

/// Emergency queue wipe
pub async fn clear_queue(State(state): State<AppState>) -> impl IntoResponse {
    let response = state.dashboard.clear_queue().await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Aggregate metrics over dashboard-created jobs
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.get_metrics())
}

/// The reconciled job list
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.list_jobs().await)
}

/// One job with derived metrics
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let response = state.dashboard.get_job(&job_id).await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(response))
}

/// One page of a crawl's scraped output
pub async fn get_job_data(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<JobDataQuery>,
) -> impl IntoResponse {
    let response = state
        .dashboard
        .get_job_data(&job_id, query.skip, query.limit)
        .await;
    let status = if response.success {
        StatusCode::OK
    } else if response.not_found {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Create a job and start processing it
pub async fn start_job(
    State(state): State<AppState>,
    Json(request): Json<StartJobRequest>,
) -> impl IntoResponse {
    debug!(
        job_type = %request.job_type,
        urls = request.urls.len(),
        "HTTP start job request"
    );
    let response = state
        .dashboard
        .start_job(&request.job_type, request.urls, request.limit);
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(response))
}

/// Cancel one job
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let response = state.dashboard.cancel_job(&job_id).await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    (status, Json(response))
}

/// Cancel every active job
pub async fn cancel_all_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.cancel_all().await)
}
