//! In-process publish/subscribe broker.
//!
//! Every clone of a [`MemoryRelay`] shares one bus, so several hubs embedded
//! in the same process fan out to each other exactly as separate processes
//! would over [`PeerRelay`](super::PeerRelay). It also backs the local side
//! of the peer relay. It never leaves the process.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};

use crate::domain::{Relay, RelayDelivery, RelayError, RelaySubscription, topic_matches};

pub const DEFAULT_MEMORY_RELAY_BUFFER: usize = 1024;

/// Shared in-memory relay bus.
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    bus: broadcast::Sender<RelayDelivery>,
    buffer_size: usize,
}

impl MemoryRelay {
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        let (bus, _) = broadcast::channel(buffer_size);
        Self { bus, buffer_size }
    }

    /// Number of live subscriptions on the bus.
    pub fn subscriber_count(&self) -> usize {
        self.bus.receiver_count()
    }

    /// Wait until at least `count` subscriptions are live.
    pub async fn wait_for_subscribers(&self, count: usize) {
        while self.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_RELAY_BUFFER)
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), RelayError> {
        // No subscriber anywhere is not an error.
        let _ = self.bus.send(RelayDelivery {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<RelaySubscription, RelayError> {
        let mut bus_rx = self.bus.subscribe();
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let pattern = pattern.to_string();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    received = bus_rx.recv() => received,
                    // The subscriber dropped its receiver
                    _ = tx.closed() => break,
                };
                match received {
                    Ok(delivery) => {
                        if topic_matches(&pattern, &delivery.topic) && tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, pattern = %pattern, "memory relay subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_filters_by_pattern() {
        // テスト項目: 購読パターンに一致するトピックだけが届く
        // given (前提条件):
        let relay = MemoryRelay::new(16);
        let mut subscription = relay.subscribe("room:*").await.unwrap();

        // when (操作):
        relay.publish("presence:x", "skip".to_string()).await.unwrap();
        relay.publish("room:a", "keep".to_string()).await.unwrap();

        // then (期待する結果):
        let delivery = subscription.recv().await.unwrap();
        assert_eq!(delivery.topic, "room:a");
        assert_eq!(delivery.payload, "keep");
    }

    #[tokio::test]
    async fn test_clones_share_one_bus() {
        // テスト項目: クローンしたリレー同士は同じバスを共有する
        let relay = MemoryRelay::new(16);
        let other = relay.clone();
        let mut subscription = other.subscribe("room:*").await.unwrap();
        relay.wait_for_subscribers(1).await;

        relay.publish("room:a", "hello".to_string()).await.unwrap();

        assert_eq!(subscription.recv().await.unwrap().payload, "hello");
    }

    #[tokio::test]
    async fn test_dropped_subscription_releases_bus() {
        // テスト項目: 購読を破棄すると、次の publish を待たずにバスから外れる
        // given (前提条件):
        let relay = MemoryRelay::new(16);
        let subscription = relay.subscribe("room:*").await.unwrap();
        assert_eq!(relay.subscriber_count(), 1);

        // when (操作):
        drop(subscription);

        // then (期待する結果):
        tokio::time::timeout(Duration::from_secs(1), async {
            while relay.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("forwarding task still holds the bus");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let relay = MemoryRelay::new(16);
        assert!(relay.publish("room:a", "x".to_string()).await.is_ok());
    }
}
