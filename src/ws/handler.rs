//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::{ConnectParams, run_connection};
use crate::app_state::AppState;
use crate::domain::stream_id::StreamId;
use crate::worker::RequestMetadata;

/// Query parameters accepted by the `/ws` upgrade.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Stable stream id to resume; omitted for a fresh connection.
    pub stream_id: Option<String>,
    /// Credential token.
    pub token: Option<String>,
    /// Optional device label, forwarded to the workers as metadata.
    pub device: Option<String>,
}

/// `GET /ws` — Upgrade the HTTP connection to a broker stream.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let stream_id = query.stream_id.map_or_else(StreamId::new, StreamId::from);
    let token = query.token.unwrap_or_default();
    let mut metadata = RequestMetadata::new();
    if let Some(device) = query.device {
        metadata.insert("device", device);
    }
    let params = ConnectParams {
        stream_id,
        token,
        metadata,
    };
    ws.on_upgrade(move |socket| run_connection(socket, state, params))
}
