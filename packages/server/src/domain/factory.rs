//! Factories for generated identifiers.

use super::value_object::{ConnectionId, NodeId};

/// Generates identifiers for accepted sockets.
pub struct ConnectionIdFactory;

impl ConnectionIdFactory {
    /// Generate a new ConnectionId with a random UUID v4.
    pub fn generate() -> ConnectionId {
        ConnectionId::from_uuid(uuid::Uuid::new_v4())
    }
}

/// Generates the per-process node identifier used by the relay.
pub struct NodeIdFactory;

impl NodeIdFactory {
    pub fn generate() -> NodeId {
        NodeId::from_uuid(uuid::Uuid::new_v4())
    }
}
