use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Mount the `/jobs` resource routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/jobs/{job_id}/exec", post(jobs::exec_job))
        .route("/jobs/{job_id}/health", get(jobs::job_health))
        .route("/jobs/{job_id}/stop", post(jobs::stop_job))
}
