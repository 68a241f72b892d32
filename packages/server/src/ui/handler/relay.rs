//! Inbound side of the peer relay.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;

use crate::{
    infrastructure::relay::PeerRelay,
    ui::state::{AppState, RelayQuery},
};

/// Accept a link from another server. Peers are rejected before the upgrade
/// since they only need an HTTP status, unlike browser clients.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RelayQuery>,
) -> Response {
    let Some(peers) = state.peers.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !peers.accepts(query.secret.as_deref()) {
        tracing::warn!("Rejecting relay peer with a bad secret");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| receive_from_peer(socket, peers))
}

async fn receive_from_peer(mut socket: WebSocket, peers: Arc<PeerRelay>) {
    tracing::info!("Relay peer attached");
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if let Err(e) = peers.deliver_text(text.as_str()).await {
                    tracing::warn!("Discarding relay frame from peer: {}", e);
                }
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Relay peer link error: {}", e);
                break;
            }
        }
    }
    tracing::info!("Relay peer detached");
}
