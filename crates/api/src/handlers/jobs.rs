//! Handlers for the `/jobs` resource: trigger, status, health, stop.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use datalift_core::job::JobDescriptor;
use datalift_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Optional parameters for the exec endpoint.
#[derive(Debug, Deserialize)]
pub struct ExecQuery {
    /// Parent job this one is chained to; its success cascades here.
    pub parent_job_id: Option<String>,
}

/// Response for a dispatched run.
#[derive(Debug, Serialize)]
pub struct ExecResponse {
    pub job_id: String,
}

/// Response for the per-job health probe.
#[derive(Debug, Serialize)]
pub struct JobHealthResponse {
    pub job_id: String,
    pub alive: bool,
}

/// Response for a stop request.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub job_id: String,
    pub accepted: bool,
}

// ---------------------------------------------------------------------------
// Exec
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{job_id}/exec
///
/// Accepts a serialized job descriptor, persists it, and dispatches a
/// run. Returns the job id synchronously once the run is dispatched; the
/// run itself completes asynchronously.
pub async fn exec_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ExecQuery>,
    Json(descriptor): Json<JobDescriptor>,
) -> AppResult<impl IntoResponse> {
    if descriptor.job_id != job_id {
        return Err(AppError::BadRequest(format!(
            "Descriptor job id \"{}\" does not match path job id \"{job_id}\"",
            descriptor.job_id
        )));
    }
    descriptor.validate()?;

    JobRepo::upsert_descriptor(&state.pool, &descriptor, params.parent_job_id.as_deref()).await?;
    state.dispatcher.dispatch(descriptor)?;

    tracing::info!(job_id = %job_id, "Job run accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: ExecResponse { job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{job_id}
///
/// Current job row: status, time range, counters, task relation.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, &job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job \"{job_id}\"")))?;

    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{job_id}/health
///
/// Whether a monitor/handler task for the job id is currently alive.
pub async fn job_health(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let alive = state.dispatcher.is_alive(&job_id);
    Ok(Json(DataResponse {
        data: JobHealthResponse { job_id, alive },
    }))
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{job_id}/stop
///
/// Cooperative stop: sets the run's cancellation flag. Observed only at
/// the pre-submission checkpoint; a run already past submission finishes
/// its in-flight transfer.
pub async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !state.dispatcher.request_stop(&job_id) {
        return Err(AppError::NotFound(format!("Run for job \"{job_id}\"")));
    }

    Ok(Json(DataResponse {
        data: StopResponse {
            job_id,
            accepted: true,
        },
    }))
}
