use axum::extract::{Path, State};
use axum::Json;
use lettergate_access::AccessDecision;

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /api/access/{session}
pub async fn get_access(
    State(state): State<SharedState>,
    Path(session): Path<String>,
) -> Result<Json<AccessDecision>, ApiError> {
    let decision = state.gate.evaluate(Some(&session)).await?;
    Ok(Json(decision))
}
