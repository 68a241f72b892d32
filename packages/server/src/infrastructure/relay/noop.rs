//! Relay used when no shared transport is configured.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{Relay, RelayError, RelaySubscription};

/// Disabled relay: publishes go nowhere and subscriptions end immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRelay;

#[async_trait]
impl Relay for NoopRelay {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn publish(&self, _topic: &str, _payload: String) -> Result<(), RelayError> {
        Ok(())
    }

    async fn subscribe(&self, _pattern: &str) -> Result<RelaySubscription, RelayError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}
