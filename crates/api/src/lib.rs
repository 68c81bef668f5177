//! HTTP surface of the lettergate control plane.

pub mod client;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use error::ApiError;
pub use state::{AppState, GateMetrics, SharedState};

/// Build the router with every `/api` route and middleware.
pub fn build_router(state: SharedState) -> Router {
    // Public reads also pass the per-IP `api` window.
    let public_reads = Router::new()
        .route("/api/access/{session}", get(routes::access::get_access))
        .route("/api/ratelimit/ai/{session}", get(routes::ratelimit::get_ai_status))
        .route("/api/letters/{job_id}", get(routes::letters::get_status))
        .route_layer(from_fn_with_state(state.clone(), middleware::api_rate_limit));

    let router = Router::new()
        // Health and metrics
        .route("/api/health", get(routes::health::health_check))
        .route("/api/metrics", get(routes::metrics::get_metrics))
        .route("/api/stats", get(routes::stats::get_stats))
        // Tracking and the letter flow
        .route("/api/visitors/track", post(routes::visitors::track))
        .route("/api/letters", post(routes::letters::submit))
        // Admin
        .route("/api/ratelimit/{identifier}", delete(routes::ratelimit::reset))
        // Worker call-backs
        .route("/api/worker/claim", post(routes::worker::claim))
        .route("/api/worker/jobs/{id}/progress", post(routes::worker::progress))
        .route("/api/worker/jobs/{id}/complete", post(routes::worker::complete))
        .route("/api/worker/jobs/{id}/fail", post(routes::worker::fail))
        .route("/api/worker/jobs/{id}/retry", post(routes::worker::retry))
        .merge(public_reads)
        .layer(from_fn_with_state(state.clone(), middleware::global_rate_limit));

    let cors_enabled = state.config.server.cors;
    let router = router.with_state(state);

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Serve the API until `shutdown` resolves.
pub async fn run_server<F>(state: SharedState, listen_addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(listen = %listen_addr, "lettergate API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Convenience: wrap an [`AppState`] for the router.
pub fn shared(state: AppState) -> SharedState {
    Arc::new(state)
}
