//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};
use roomcast_shared::time::{millis_to_jst_rfc3339, now_millis};

use crate::{
    infrastructure::dto::http::{RoomListDto, RoomSummaryDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Rooms currently alive on this node with their member counts
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<RoomListDto> {
    let rooms = state
        .hub
        .rooms()
        .await
        .into_iter()
        .map(|(room, members)| RoomSummaryDto {
            id: room.to_string(),
            members,
        })
        .collect();

    Json(RoomListDto {
        node_id: state.hub.node_id().to_string(),
        rooms,
        generated_at: millis_to_jst_rfc3339(now_millis()),
    })
}
