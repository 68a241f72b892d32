//! WebSocket peer mesh relay.
//!
//! Every server dials the `/relay` endpoint of each configured peer and
//! publishes over those outbound links. Frames arriving on its own `/relay`
//! endpoint are handed to [`PeerRelay::deliver_text`] and fan out to local
//! subscriptions through an in-process bus. Nothing received from a peer is
//! forwarded again, so each server lists every other server as a peer.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use super::MemoryRelay;
use crate::domain::{Relay, RelayDelivery, RelayError, RelaySubscription};

pub const PEER_LINK_BUFFER: usize = 1024;
pub const PEER_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Query parameter carrying the shared relay secret.
pub const SECRET_PARAM: &str = "secret";

#[derive(Debug)]
struct PeerLink {
    url: Url,
    frames: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
}

/// Relay that reaches other server processes over WebSocket links.
#[derive(Debug)]
pub struct PeerRelay {
    local: MemoryRelay,
    links: Vec<PeerLink>,
    secret: Option<String>,
}

impl PeerRelay {
    /// Start one link task per peer. Must be called inside a Tokio runtime.
    pub fn start(peers: impl IntoIterator<Item = Url>, secret: Option<String>) -> Self {
        let links = peers
            .into_iter()
            .map(|mut url| {
                if let Some(secret) = &secret {
                    url.query_pairs_mut().append_pair(SECRET_PARAM, secret);
                }
                let (frames, rx) = mpsc::channel(PEER_LINK_BUFFER);
                let connected = Arc::new(AtomicBool::new(false));
                tokio::spawn(run_link(url.clone(), rx, connected.clone()));
                PeerLink {
                    url,
                    frames,
                    connected,
                }
            })
            .collect();
        Self {
            local: MemoryRelay::default(),
            links,
            secret,
        }
    }

    /// Whether an inbound peer presenting `secret` may attach.
    pub fn accepts(&self, secret: Option<&str>) -> bool {
        match &self.secret {
            Some(expected) => secret == Some(expected.as_str()),
            None => true,
        }
    }

    /// Decode a frame received from a peer and hand it to local subscribers.
    pub async fn deliver_text(&self, text: &str) -> Result<(), RelayError> {
        let delivery: RelayDelivery = serde_json::from_str(text)?;
        self.local.publish(&delivery.topic, delivery.payload).await
    }

    /// Outbound links currently connected.
    pub fn connected_peers(&self) -> usize {
        self.links
            .iter()
            .filter(|link| link.connected.load(Ordering::Acquire))
            .count()
    }

    /// Wait until at least `count` outbound links are connected.
    pub async fn wait_for_peers(&self, count: usize) {
        while self.connected_peers() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Live local subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.local.subscriber_count()
    }
}

#[async_trait]
impl Relay for PeerRelay {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), RelayError> {
        if self.links.is_empty() {
            return Ok(());
        }
        let text = serde_json::to_string(&RelayDelivery {
            topic: topic.to_string(),
            payload,
        })?;

        let mut unreachable = Vec::new();
        for link in &self.links {
            if !link.connected.load(Ordering::Acquire) {
                unreachable.push(link.url.host_str().unwrap_or_default().to_string());
                continue;
            }
            if link.frames.try_send(text.clone()).is_err() {
                unreachable.push(link.url.host_str().unwrap_or_default().to_string());
            }
        }
        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(RelayError::Publish(format!(
                "{} of {} peers unreachable: {}",
                unreachable.len(),
                self.links.len(),
                unreachable.join(", ")
            )))
        }
    }

    async fn subscribe(&self, pattern: &str) -> Result<RelaySubscription, RelayError> {
        self.local.subscribe(pattern).await
    }
}

/// Keep one outbound link to a peer alive until the relay is dropped.
async fn run_link(url: Url, mut frames: mpsc::Receiver<String>, connected: Arc<AtomicBool>) {
    let peer = url.host_str().unwrap_or_default().to_string();
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                tracing::info!(peer = %peer, "relay peer connected");
                connected.store(true, Ordering::Release);
                let (mut sink, mut incoming) = stream.split();
                let failure = loop {
                    tokio::select! {
                        frame = frames.recv() => match frame {
                            Some(text) => {
                                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                                    break Some(e.to_string());
                                }
                            }
                            None => {
                                let _ = sink.close().await;
                                break None;
                            }
                        },
                        received = incoming.next() => match received {
                            Some(Ok(WsMessage::Close(_))) | None => break Some("closed by peer".to_string()),
                            Some(Err(e)) => break Some(e.to_string()),
                            Some(Ok(_)) => {}
                        },
                    }
                };
                connected.store(false, Ordering::Release);
                match failure {
                    Some(reason) => tracing::warn!(peer = %peer, reason = %reason, "relay peer link lost"),
                    None => return,
                }
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "relay peer unreachable");
            }
        }

        // Wait before dialing again; frames published meanwhile are lost.
        let delay = tokio::time::sleep(PEER_RECONNECT_DELAY);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                frame = frames.recv() => {
                    if frame.is_none() {
                        return;
                    }
                }
            }
        }
    }
}
