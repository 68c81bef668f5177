use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lettergate_rate_limit::{LimiterClass, RateDecision};

use crate::client::ClientIp;
use crate::error::ApiError;
use crate::state::{AppState, SharedState};

/// Record a limiter decision in metrics and turn a denial into an error.
pub(crate) fn enforce(state: &AppState, limiter: &str, decision: RateDecision) -> Result<(), ApiError> {
    if decision.degraded {
        state.metrics.fail_open.with_label_values(&[limiter]).inc();
    }
    if decision.allowed {
        return Ok(());
    }
    let reason = decision.reason.map(|r| r.as_str()).unwrap_or("RATE_LIMITED");
    state
        .metrics
        .rate_limited
        .with_label_values(&[limiter, reason])
        .inc();
    Err(ApiError::RateLimited(decision))
}

async fn limit_by_ip(state: &AppState, class: LimiterClass, client: &ClientIp) -> Result<(), ApiError> {
    let identifier = client.identifier();
    let decision = state.limiter.check(class, &identifier).await;
    if !decision.allowed {
        tracing::debug!(class = class.as_str(), client = %identifier, "request rate limited");
    }
    enforce(state, class.as_str(), decision)
}

/// Global per-IP sliding window and request metrics for the whole `/api`
/// surface.
pub async fn global_rate_limit(
    State(state): State<SharedState>,
    client: ClientIp,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    state.metrics.requests_total.inc();

    let response = match limit_by_ip(&state, LimiterClass::Global, &client).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    };

    state
        .metrics
        .request_duration
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .observe(started.elapsed().as_secs_f64());
    response
}

/// Per-IP `api` class window for the public read endpoints.
pub async fn api_rate_limit(
    State(state): State<SharedState>,
    client: ClientIp,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    limit_by_ip(&state, LimiterClass::Api, &client).await?;
    Ok(next.run(req).await)
}
