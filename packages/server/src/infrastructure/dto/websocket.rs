//! Payloads of server-originated WebSocket messages.

use serde::{Deserialize, Serialize};

/// Payload of the `connected` message sent right after a socket is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub connection_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub rooms: Vec<String>,
    /// Unix timestamp (milliseconds)
    pub connected_at: i64,
}

/// Payload of the `error` message sent when an inbound frame is rejected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub reason: String,
}
