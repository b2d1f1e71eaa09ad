//! HTTP API Route Definitions
//!
//! Defines the REST API routes for the dashboard.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router with all routes
pub fn create_router(app_state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/health/full", get(handlers::full_health))
        .route("/queue", get(handlers::queue_status).delete(handlers::clear_queue))
        .route("/metrics", get(handlers::metrics))
        .route("/jobs", get(handlers::list_jobs).delete(handlers::cancel_all_jobs))
        .route("/jobs/start", post(handlers::start_job))
        .route("/jobs/:job_id", get(handlers::get_job).delete(handlers::cancel_job))
        .route("/jobs/:job_id/data", get(handlers::get_job_data))
        .with_state(app_state);

    Router::new().nest("/api", api)
}
