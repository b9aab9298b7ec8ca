use axum::{
    extract::{
        Query, State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, header},
    response::Response,
};
use serde::Deserialize;
use tracing::warn;

use wetalk_gateway::connection::handle_connection;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    token: Option<String>,
}

/// GET /live?token=...: authenticate, check the origin, then hand the socket
/// to the relay.
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LiveQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    // A missing Origin means a non-browser client
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !state.origin_allowed(origin) {
            warn!("Rejected live connection from origin {:?}", origin);
            return Err(ApiError::Forbidden(format!("Origin {} is not allowed", origin)));
        }
    }

    let token = query.token.ok_or(ApiError::Unauthorized)?;
    let claims = state.decode_token(&token)?;

    let ws = ws.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
    let relay = state.relay.clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, relay, claims.sub)))
}
