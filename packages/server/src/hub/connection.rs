//! One accepted, authenticated socket and its delivery path.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use roomcast_shared::{Message, kind};
use tokio::sync::mpsc;

use super::{
    batch::{BatchConfig, Batcher},
    outbound::{Enqueue, Outbound, OutboundQueue},
};
use crate::domain::{ConnectionId, ConnectionIdFactory, Identity};

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// How messages reach a connection's socket.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub outbound_capacity: usize,
    /// `None` disables batching; every message is sent directly.
    pub batching: Option<BatchConfig>,
    /// Message types routed through the batching buffer.
    pub batched_types: HashSet<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            batching: Some(BatchConfig::default()),
            batched_types: [kind::PRESENCE, kind::TYPING]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// A live socket bound to an identity.
///
/// Room membership is not stored here; the hub owns it.
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    queue: Arc<OutboundQueue>,
    batcher: Option<Batcher>,
    batched_types: HashSet<String>,
    closed: AtomicBool,
}

impl Connection {
    /// Create a connection and the receiver its writer loop drains.
    pub fn new(identity: Identity, config: &DeliveryConfig) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (queue, rx) = OutboundQueue::new(config.outbound_capacity);
        let queue = Arc::new(queue);
        let batcher = config
            .batching
            .map(|batch_config| Batcher::new(batch_config, queue.clone()));
        let connection = Self {
            id: ConnectionIdFactory::generate(),
            identity,
            queue,
            batcher,
            batched_types: config.batched_types.clone(),
            closed: AtomicBool::new(false),
        };
        (Arc::new(connection), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Non-blocking enqueue; drops the message when the queue is full.
    pub fn send(&self, message: Outbound) -> Enqueue {
        let result = self.queue.try_send(message);
        if result == Enqueue::Dropped {
            tracing::warn!(
                conn_id = %self.id,
                total_dropped = self.queue.dropped(),
                "outbound queue full, dropping message"
            );
        }
        result
    }

    /// Buffer `message` for batched delivery, or send it directly when
    /// batching is disabled.
    pub fn send_batched(&self, message: Message) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match &self.batcher {
            Some(batcher) => batcher.append(message),
            None => {
                self.send(Arc::new(message));
            }
        }
    }

    /// Route a broadcast message: configured low-value types go through the
    /// batching buffer, everything else straight to the queue.
    pub fn deliver(&self, message: &Outbound) -> Enqueue {
        if self.is_closed() {
            return Enqueue::Closed;
        }
        if self.batcher.is_some() && self.batched_types.contains(&message.kind) {
            self.send_batched(Message::clone(message));
            return Enqueue::Queued;
        }
        self.send(message.clone())
    }

    /// Flush the batching buffer, then close the outbound queue so the writer
    /// loop ends after writing what is left. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(batcher) = &self.batcher {
            let flushed = batcher.force_flush();
            if flushed > 0 {
                tracing::debug!(conn_id = %self.id, flushed, "flushed batch on close");
            }
        }
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}
