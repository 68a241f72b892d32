//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

/// Room summary for the room list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummaryDto {
    pub id: String,
    pub members: usize,
}

/// Response of the room list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListDto {
    pub node_id: String,
    pub rooms: Vec<RoomSummaryDto>,
    pub generated_at: String, // ISO 8601
}
