//! Background task re-injecting relayed broadcasts into the local hub.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use super::{Hub, ROOM_TOPIC_PATTERN};

/// Wait before subscribing again after the transport dropped us.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Start the relay subscriber for `hub`.
///
/// Returns `None` when the hub's relay is disabled. The task runs until
/// aborted; transport failures only pause cross-process propagation.
pub fn spawn_relay_subscriber(hub: Arc<Hub>) -> Option<JoinHandle<()>> {
    if !hub.relay().is_enabled() {
        return None;
    }
    Some(tokio::spawn(run_subscriber(hub)))
}

async fn run_subscriber(hub: Arc<Hub>) {
    tracing::info!(node_id = %hub.node_id(), "relay subscriber started");
    loop {
        match hub.relay().subscribe(ROOM_TOPIC_PATTERN).await {
            Ok(mut subscription) => {
                while let Some(delivery) = subscription.recv().await {
                    match hub.accept_relayed(&delivery).await {
                        Ok(delivered) => {
                            tracing::trace!(topic = %delivery.topic, delivered, "relayed broadcast");
                        }
                        Err(e) => {
                            tracing::warn!(topic = %delivery.topic, error = %e, "discarding relay frame");
                        }
                    }
                }
                tracing::warn!("relay subscription ended; resubscribing");
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay subscribe failed; retrying");
            }
        }
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}
