//! Bounded per-connection outbound queue and its drain loop.
//!
//! Enqueueing never waits: when the queue is full the message is dropped and
//! counted. One slow socket therefore cannot stall a broadcast to everyone
//! else, at the price of best-effort delivery for that socket.

use std::{
    fmt::Display,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use futures_util::{Sink, SinkExt};
use roomcast_shared::Message;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Messages are shared between every member a broadcast reaches.
pub type Outbound = Arc<Message>;

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The queue was full; the message was discarded.
    Dropped,
    /// The queue has been closed; the message was discarded.
    Closed,
}

/// Producer side of a connection's outbound queue.
pub struct OutboundQueue {
    sender: Mutex<Option<mpsc::Sender<Outbound>>>,
    dropped: AtomicU64,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` pending messages.
    ///
    /// The receiver is handed to [`drain`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender: Mutex::new(Some(tx)),
            dropped: AtomicU64::new(0),
        };
        (queue, rx)
    }

    /// Try to enqueue without waiting.
    pub fn try_send(&self, message: Outbound) -> Enqueue {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Enqueue::Closed;
        };
        match tx.try_send(message) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Enqueue::Dropped
            }
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Close the queue. Messages already queued are still drained; later
    /// enqueues report [`Enqueue::Closed`].
    pub fn close(&self) {
        let mut guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|tx| tx.is_closed())
    }

    /// Total messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("socket write failed: {0}")]
    Write(String),
}

/// Serialize and write queued messages to `sink`, strictly in enqueue order.
///
/// Returns `Ok(n)` once the queue is closed and empty, or the first write
/// error. A message that fails to encode is skipped.
pub async fn drain<S>(mut rx: mpsc::Receiver<Outbound>, mut sink: S) -> Result<usize, DrainError>
where
    S: Sink<String> + Unpin,
    S::Error: Display,
{
    let mut written = 0;
    while let Some(message) = rx.recv().await {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(kind = %message.kind, error = %e, "dropping unencodable message");
                continue;
            }
        };
        sink.send(text)
            .await
            .map_err(|e| DrainError::Write(e.to_string()))?;
        written += 1;
    }
    Ok(written)
}
