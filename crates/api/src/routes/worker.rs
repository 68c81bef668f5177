//! Call-backs used by the external generation worker.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lettergate_jobs::{JobStatus, JobStatusView};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    #[serde(default = "default_progress_status")]
    pub status: JobStatus,
    pub progress: u8,
}

fn default_progress_status() -> JobStatus {
    JobStatus::Processing
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub motivation_id: String,
    pub anti_motivation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    #[serde(default)]
    pub error: String,
}

/// POST /api/worker/claim
///
/// Long-polls the queue; 204 when nothing arrived within the dequeue
/// timeout.
pub async fn claim(State(state): State<SharedState>) -> Result<Response, ApiError> {
    match state.jobs.claim().await? {
        Some(job) => Ok(Json(job).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /api/worker/jobs/{id}/progress
pub async fn progress(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<ProgressRequest>,
) -> Result<Json<JobStatusView>, ApiError> {
    let job = state
        .jobs
        .update_progress(job_id, body.status, body.progress)
        .await?;
    Ok(Json(state.jobs.view(&job)))
}

/// POST /api/worker/jobs/{id}/complete
pub async fn complete(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<JobStatusView>, ApiError> {
    if body.motivation_id.trim().is_empty() || body.anti_motivation_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "both result ids are required to complete a job".to_string(),
        ));
    }
    let job = state
        .jobs
        .complete(job_id, body.motivation_id, body.anti_motivation_id)
        .await?;
    state.metrics.job_event("completed");
    Ok(Json(state.jobs.view(&job)))
}

/// POST /api/worker/jobs/{id}/fail
pub async fn fail(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<FailRequest>,
) -> Result<Json<JobStatusView>, ApiError> {
    let job = state.jobs.fail(job_id, &body.error).await?;
    state.metrics.job_event("failed");
    Ok(Json(state.jobs.view(&job)))
}

/// POST /api/worker/jobs/{id}/retry
///
/// 409 once the job has used all its retries.
pub async fn retry(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusView>, ApiError> {
    let job = state.jobs.retry(job_id).await?;
    state.metrics.job_event("retried");
    Ok(Json(state.jobs.view(&job)))
}
