use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::{GateMetrics, SharedState};

/// GET /api/stats
///
/// Counter summary plus the current letter queue depth. The depth is
/// `null` when the store cannot be reached.
pub async fn get_stats(State(state): State<SharedState>) -> Json<Value> {
    let metrics = &state.metrics;
    let uptime_secs = state.start_time.elapsed().as_secs();

    let queue_depth = match state.jobs.queue_depth().await {
        Ok(depth) => Some(depth),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read queue depth");
            None
        }
    };

    let job_count = |event: &str| metrics.jobs.with_label_values(&[event]).get();

    Json(json!({
        "uptime_secs": uptime_secs,
        "total_requests": metrics.requests_total.get(),
        "access": {
            "granted": metrics.access_decisions.with_label_values(&["granted", "profile_bypass"]).get()
                + metrics.access_decisions.with_label_values(&["granted", "visits_threshold"]).get(),
            "denied": metrics.access_decisions.with_label_values(&["denied", "insufficient_visits"]).get()
                + metrics.access_decisions.with_label_values(&["denied", "no_session"]).get(),
            "bypass_promotions": metrics.bypass_promotions.get(),
        },
        "rate_limited_requests": GateMetrics::total(&metrics.rate_limited),
        "fail_open_checks": GateMetrics::total(&metrics.fail_open),
        "profiles_detected": GateMetrics::total(&metrics.profiles_detected),
        "jobs": {
            "enqueued": job_count("enqueued"),
            "completed": job_count("completed"),
            "failed": job_count("failed"),
            "retried": job_count("retried"),
            "queue_depth": queue_depth,
        },
    }))
}
