use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /api/metrics
pub async fn get_metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let (content_type, body) = state.metrics.render().map_err(|e| {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
        anyhow::anyhow!("failed to encode metrics: {}", e)
    })?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
