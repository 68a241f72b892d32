//! Identity and scope bound to an accepted connection.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::value_object::{ChannelId, ProjectId, RoomId, UserId};

/// Authenticated identity of a connection.
///
/// Display attributes are resolved once at connect time and cached here, so
/// stamping a sender onto outgoing messages never needs another lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(user_id: UserId, display_name: Option<String>) -> Self {
        Self {
            user_id,
            display_name,
        }
    }

    /// JSON object attached to relayed messages as `sender`.
    pub fn sender_value(&self) -> Value {
        json!({
            "user_id": self.user_id.as_str(),
            "display_name": self.display_name,
        })
    }
}

/// Where a connection currently sits: its project and, optionally, one
/// channel inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub project: ProjectId,
    pub channel: Option<ChannelId>,
}

impl Scope {
    pub fn new(project: ProjectId, channel: Option<ChannelId>) -> Self {
        Self { project, channel }
    }

    pub fn project_room(&self) -> RoomId {
        RoomId::project(&self.project)
    }

    pub fn channel_room(&self) -> Option<RoomId> {
        self.channel
            .as_ref()
            .map(|channel| RoomId::channel(&self.project, channel))
    }

    /// Room that application messages from this connection are broadcast to.
    pub fn target_room(&self) -> RoomId {
        self.channel_room().unwrap_or_else(|| self.project_room())
    }
}
