//! Domain layer for the broadcast server.
//!
//! Value objects, the authenticated identity bound to a connection, and the
//! traits for the collaborators the hub depends on (credential verification
//! and the cross-process relay). Implementations live in `infrastructure`.

pub mod auth;
pub mod entity;
pub mod error;
pub mod factory;
pub mod relay;
pub mod value_object;

pub use auth::CredentialVerifier;
pub use entity::{Identity, Scope};
pub use error::{AuthError, RelayError, ValueObjectError};
pub use factory::{ConnectionIdFactory, NodeIdFactory};
pub use relay::{Relay, RelayDelivery, RelaySubscription, topic_matches};
#[cfg(test)]
pub use relay::MockRelay;
pub use value_object::{ChannelId, ConnectionId, NodeId, ProjectId, RoomId, UserId};
