//! Cross-process publish/subscribe transport used for fan-out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::error::RelayError;

/// One payload received from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDelivery {
    pub topic: String,
    pub payload: String,
}

/// Stream of deliveries for one subscription. Ends when the transport drops
/// the subscription.
pub type RelaySubscription = mpsc::Receiver<RelayDelivery>;

/// Shared publish/subscribe transport between server processes.
///
/// A single-process deployment uses a transport that is disabled, and the hub
/// then behaves purely locally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Relay: Send + Sync {
    /// Whether publishes go anywhere. The hub skips serialization and does
    /// not start a subscriber when this is `false`.
    fn is_enabled(&self) -> bool;

    async fn publish(&self, topic: &str, payload: String) -> Result<(), RelayError>;

    /// Subscribe to every topic matching `pattern` (`prefix*` or an exact
    /// topic).
    async fn subscribe(&self, pattern: &str) -> Result<RelaySubscription, RelayError>;
}

/// Whether `topic` matches a subscription `pattern`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("room:*", "room:project:p1"));
        assert!(topic_matches("room:a", "room:a"));
        assert!(!topic_matches("room:a", "room:b"));
        assert!(!topic_matches("room:*", "presence:x"));
    }
}
