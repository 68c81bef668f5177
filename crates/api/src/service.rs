//! The letter request flow: access gate, rate limits, enqueue, commit.

use lettergate_access::Observation;
use lettergate_jobs::LetterRequest;
use lettergate_profile::RequestSignals;
use lettergate_rate_limit::{DenyReason, LimiterClass};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::enforce;
use crate::state::AppState;

fn validate(request: &LetterRequest) -> Result<(), ApiError> {
    if request.session_id.trim().is_empty() {
        return Err(ApiError::Validation("session_id must not be empty".to_string()));
    }
    if request.company.trim().is_empty() {
        return Err(ApiError::Validation("company must not be empty".to_string()));
    }
    Ok(())
}

/// Run a letter request through the control plane and return the job id.
///
/// Usage is committed only after the job is safely queued; a failed commit
/// is logged and the job still stands.
pub async fn submit_letter(state: &AppState, request: LetterRequest) -> Result<Uuid, ApiError> {
    validate(&request)?;
    let session = request.session_id.trim().to_string();

    let access = state.gate.evaluate(Some(&session)).await?;
    let outcome = if access.granted { "granted" } else { "denied" };
    state
        .metrics
        .access_decisions
        .with_label_values(&[outcome, access.reason.as_str()])
        .inc();
    if !access.granted {
        tracing::info!(
            session = %session,
            reason = access.reason.as_str(),
            visits_remaining = access.visits_remaining,
            "letter request denied by access gate"
        );
        return Err(ApiError::AccessDenied(access));
    }

    let decision = state.limiter.check_ai(&session).await;
    let limiter = match decision.reason {
        Some(DenyReason::CooldownActive | DenyReason::DailyLimitReached) => "ai_daily",
        _ => LimiterClass::Ai.as_str(),
    };
    enforce(state, limiter, decision)?;

    let request = LetterRequest {
        session_id: session.clone(),
        ..request
    };
    let job_id = state.jobs.enqueue(&request).await?;
    state.metrics.job_event("enqueued");

    if let Err(e) = state.limiter.commit_ai(&session).await {
        tracing::warn!(session = %session, %job_id, error = %e, "failed to commit AI usage");
    }

    Ok(job_id)
}

/// Tracking entry point: record the visit and refresh the profile.
pub async fn track_visitor(
    state: &AppState,
    session: &str,
    new_session: bool,
    signals: &RequestSignals,
) -> Result<Observation, ApiError> {
    if session.trim().is_empty() {
        return Err(ApiError::Validation("session_id must not be empty".to_string()));
    }

    let observation = state.gate.observe(session.trim(), new_session, signals).await?;
    if !observation.cached {
        state
            .metrics
            .profiles_detected
            .with_label_values(&[observation.profile.profile_type.as_str()])
            .inc();
    }
    if observation.promoted {
        state.metrics.bypass_promotions.inc();
    }
    Ok(observation)
}
