use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use lettergate_jobs::{JobStatusView, LetterRequest};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::service::submit_letter;
use crate::state::SharedState;

/// POST /api/letters
///
/// Accepts a generation request and answers 202 with the job id to poll.
pub async fn submit(
    State(state): State<SharedState>,
    Json(request): Json<LetterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let job_id = submit_letter(&state, request).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

/// GET /api/letters/{job_id}
pub async fn get_status(
    State(state): State<SharedState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusView>, ApiError> {
    Ok(Json(state.jobs.status(job_id).await?))
}
