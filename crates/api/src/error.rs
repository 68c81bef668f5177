use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use lettergate_access::AccessDecision;
use lettergate_common::StoreError;
use lettergate_jobs::JobError;
use lettergate_rate_limit::RateDecision;
use serde_json::json;
use thiserror::Error;

/// Seconds a client should wait before retrying after a store outage.
const STORE_RETRY_AFTER_SECS: u64 = 5;

/// Error type for every handler. Renders as
/// `{"error": {"code", "message", "retry_after_seconds"?}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {}", .0.reason.as_str())]
    AccessDenied(AccessDecision),

    #[error("rate limited")]
    RateLimited(RateDecision),

    #[error("retries exhausted: {0}")]
    RetriesExhausted(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        let message = e.to_string();
        match e {
            JobError::Store(e) => ApiError::Store(e),
            JobError::NotFound(_) => ApiError::NotFound(message),
            JobError::MaxRetriesExceeded { .. } => ApiError::RetriesExhausted(message),
            JobError::InvalidTransition { .. } => ApiError::Conflict(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_after) = match &self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR".to_string(), msg.clone(), None)
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND".to_string(), msg.clone(), None)
            }
            ApiError::AccessDenied(decision) => (
                StatusCode::FORBIDDEN,
                decision.reason.as_str().to_uppercase(),
                match decision.visits_remaining {
                    0 => "access to the letter generator is not granted".to_string(),
                    n => format!("{} more visit(s) required", n),
                },
                None,
            ),
            ApiError::RateLimited(decision) => (
                StatusCode::TOO_MANY_REQUESTS,
                decision
                    .reason
                    .map(|r| r.as_str().to_string())
                    .unwrap_or_else(|| "RATE_LIMITED".to_string()),
                "rate limit exceeded".to_string(),
                decision.retry_after_seconds,
            ),
            ApiError::RetriesExhausted(msg) => {
                (StatusCode::CONFLICT, "RETRIES_EXHAUSTED".to_string(), msg.clone(), None)
            }
            ApiError::Conflict(msg) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION".to_string(), msg.clone(), None)
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "store error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE".to_string(),
                    "the shared store is temporarily unavailable".to_string(),
                    Some(STORE_RETRY_AFTER_SECS),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR".to_string(),
                    "an internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(secs) = retry_after {
            error["retry_after_seconds"] = json!(secs);
        }
        if let ApiError::AccessDenied(decision) = &self {
            error["visits_remaining"] = json!(decision.visits_remaining);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettergate_rate_limit::DenyReason;
    use uuid::Uuid;

    #[test]
    fn rate_limited_sets_retry_after() {
        let decision = RateDecision::deny(DenyReason::CooldownActive, 5, 42, 0);
        let response = ApiError::RateLimited(decision).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn job_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        let not_found: ApiError = JobError::NotFound(id).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let exhausted: ApiError = JobError::MaxRetriesExceeded {
            job_id: id,
            max_retries: 3,
        }
        .into();
        assert_eq!(exhausted.into_response().status(), StatusCode::CONFLICT);

        let store: ApiError = JobError::Store(StoreError::Unavailable("down".into())).into();
        assert_eq!(store.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
