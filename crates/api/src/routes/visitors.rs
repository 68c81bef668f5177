use std::net::IpAddr;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use lettergate_profile::RequestSignals;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{header_string, ClientIp};
use crate::error::ApiError;
use crate::service::track_visitor;
use crate::state::SharedState;

/// Tracking payload. Signals missing from the body fall back to the
/// request's own headers and peer address.
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub session_id: String,
    #[serde(default)]
    pub new_session: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub client_ip: Option<IpAddr>,
}

/// POST /api/visitors/track
pub async fn track(
    State(state): State<SharedState>,
    client: ClientIp,
    headers: HeaderMap,
    Json(body): Json<TrackRequest>,
) -> Result<Json<Value>, ApiError> {
    let signals = RequestSignals {
        user_agent: body
            .user_agent
            .or_else(|| header_string(&headers, header::USER_AGENT)),
        referer: body
            .referer
            .or_else(|| header_string(&headers, header::REFERER)),
        client_ip: body.client_ip.or(client.0),
    };

    let observation = track_visitor(&state, &body.session_id, body.new_session, &signals).await?;
    let access = state.gate.evaluate(Some(&observation.visitor.session_id)).await?;

    Ok(Json(json!({
        "visitor": observation.visitor,
        "profile": observation.profile,
        "promoted": observation.promoted,
        "access": access,
    })))
}
