use axum::extract::{Path, State};
use axum::Json;
use lettergate_rate_limit::RateDecision;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /api/ratelimit/ai/{session}
///
/// Daily budget and cooldown for a session. Read-only.
pub async fn get_ai_status(
    State(state): State<SharedState>,
    Path(session): Path<String>,
) -> Json<RateDecision> {
    Json(state.limiter.ai_daily().check(&session).await)
}

/// DELETE /api/ratelimit/{identifier}
///
/// Clears every limiter's state for an IP or session. Idempotent.
pub async fn reset(
    State(state): State<SharedState>,
    Path(identifier): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.limiter.reset_all(&identifier).await?;
    Ok(Json(json!({
        "status": "reset",
        "identifier": identifier,
        "keys_removed": removed,
    })))
}
