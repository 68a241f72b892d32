//! Value Objects for domain models.
//!
//! Value Objects are immutable objects that represent values in the domain.
//! They are compared by their value, not by identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ValueObjectError;

const MAX_IDENTIFIER_LEN: usize = 100;

fn validate_identifier(
    field: &'static str,
    value: &str,
    empty: ValueObjectError,
) -> Result<(), ValueObjectError> {
    if value.is_empty() {
        return Err(empty);
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValueObjectError::IdentifierTooLong {
            field,
            max: MAX_IDENTIFIER_LEN,
            actual: value.len(),
        });
    }
    if value.contains(':') {
        return Err(ValueObjectError::IdentifierInvalidCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Authenticated user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        if id.is_empty() {
            return Err(ValueObjectError::UserIdEmpty);
        }
        let len = id.len();
        if len > MAX_IDENTIFIER_LEN {
            return Err(ValueObjectError::UserIdTooLong {
                max: MAX_IDENTIFIER_LEN,
                actual: len,
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Project scope a socket is opened against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        validate_identifier("ProjectId", &id, ValueObjectError::ProjectIdEmpty)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel (sub-room) inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        validate_identifier("ChannelId", &id, ValueObjectError::ChannelIdEmpty)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a broadcast room in the hub.
///
/// Rooms are derived from the connection scope: every project has one room
/// (`project:<project>`) and every channel one more
/// (`project:<project>:channel:<channel>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    pub fn project(project: &ProjectId) -> Self {
        Self(format!("project:{project}"))
    }

    pub fn channel(project: &ProjectId, channel: &ChannelId) -> Self {
        Self(format!("project:{project}:channel:{channel}"))
    }

    /// Rebuild a room key received from another process.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one server process, used to recognise relayed frames that
/// originated locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
