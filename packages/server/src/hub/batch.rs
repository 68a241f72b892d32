//! Batching buffer in front of the outbound queue.
//!
//! High-frequency, low-value messages (presence, typing) are accumulated and
//! forwarded as one `batch` envelope. The buffer is a two-state machine:
//!
//! ```text
//!            append (arms timer)
//!   Idle ─────────────────────────▶ Buffering
//!    ▲                                 │
//!    └──── flush: size reached, ───────┘
//!          timer fired, or force_flush
//! ```
//!
//! Appends and flushes, including the timer-driven one, run under the same
//! lock. A timer only flushes the buffering period that armed it.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use roomcast_shared::Message;
use tokio::task::AbortHandle;

use super::outbound::{Enqueue, OutboundQueue};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(50);

/// Flush thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Buffer length that triggers an immediate flush.
    pub max_batch_size: usize,
    /// Time after the first append that triggers a flush.
    pub interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            interval: DEFAULT_BATCH_INTERVAL,
        }
    }
}

enum Phase {
    Idle,
    Buffering {
        messages: Vec<Message>,
        timer: AbortHandle,
    },
}

struct State {
    phase: Phase,
    /// Bumped every time a buffering period starts.
    epoch: u64,
}

struct Inner {
    config: BatchConfig,
    queue: Arc<OutboundQueue>,
    state: Mutex<State>,
}

/// Batching buffer owned by one connection.
pub struct Batcher {
    inner: Arc<Inner>,
}

impl Batcher {
    pub fn new(config: BatchConfig, queue: Arc<OutboundQueue>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queue,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Buffer `message`. Flushes synchronously once the buffer reaches the
    /// maximum size; the first message into an empty buffer arms the timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn append(&self, message: Message) {
        let mut state = self.inner.lock();
        let next = match std::mem::replace(&mut state.phase, Phase::Idle) {
            Phase::Idle => {
                state.epoch += 1;
                Phase::Buffering {
                    messages: vec![message],
                    timer: self.inner.arm_timer(state.epoch),
                }
            }
            Phase::Buffering {
                mut messages,
                timer,
            } => {
                messages.push(message);
                Phase::Buffering { messages, timer }
            }
        };
        state.phase = next;

        let full = matches!(
            &state.phase,
            Phase::Buffering { messages, .. } if messages.len() >= self.inner.config.max_batch_size
        );
        if full {
            self.inner.flush_locked(&mut state);
        }
    }

    /// Flush whatever is buffered now. Returns the number of messages that
    /// left the buffer.
    pub fn force_flush(&self) -> usize {
        let mut state = self.inner.lock();
        self.inner.flush_locked(&mut state)
    }

    /// Number of messages currently buffered.
    pub fn pending(&self) -> usize {
        match &self.inner.lock().phase {
            Phase::Idle => 0,
            Phase::Buffering { messages, .. } => messages.len(),
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm_timer(self: &Arc<Self>, epoch: u64) -> AbortHandle {
        let inner = Arc::downgrade(self);
        let interval = self.config.interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(inner) = inner.upgrade() {
                inner.flush_on_timer(epoch);
            }
        })
        .abort_handle()
    }

    fn flush_on_timer(&self, epoch: u64) {
        let mut state = self.lock();
        // A flush may have won the race for the lock and a new period started.
        if state.epoch != epoch {
            return;
        }
        let flushed = self.flush_locked(&mut state);
        if flushed > 0 {
            tracing::trace!(flushed, "batch flushed by timer");
        }
    }

    fn flush_locked(&self, state: &mut State) -> usize {
        let Phase::Buffering {
            mut messages,
            timer,
        } = std::mem::replace(&mut state.phase, Phase::Idle)
        else {
            return 0;
        };
        timer.abort();

        let count = messages.len();
        let outbound = if count == 1 {
            messages.remove(0)
        } else {
            Message::batch(messages)
        };
        if self.queue.try_send(Arc::new(outbound)) == Enqueue::Dropped {
            tracing::warn!(
                count,
                total_dropped = self.queue.dropped(),
                "outbound queue full, dropping batch"
            );
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_shared::kind;
    use tokio::sync::mpsc;

    use crate::hub::outbound::Outbound;

    fn typing(i: usize) -> Message {
        Message::new(kind::TYPING).with_message_id(format!("t{i}"))
    }

    fn batcher(capacity: usize) -> (Batcher, Arc<OutboundQueue>, mpsc::Receiver<Outbound>) {
        let (queue, rx) = OutboundQueue::new(capacity);
        let queue = Arc::new(queue);
        (Batcher::new(BatchConfig::default(), queue.clone()), queue, rx)
    }

    fn ids(message: &Message) -> Vec<String> {
        message
            .clone()
            .into_messages()
            .unwrap()
            .into_iter()
            .map(|m| m.message_id.unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_messages_within_interval_become_one_batch() {
        // テスト項目: 50ms 以内に 3 件バッファすると、順序を保った 1 つのバッチとしてフラッシュされる
        // given (前提条件):
        let (batcher, _queue, mut rx) = batcher(16);

        // when (操作):
        for i in 0..3 {
            batcher.append(typing(i));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rx.try_recv().is_err(), "nothing is flushed before the timer");
        tokio::time::sleep(Duration::from_millis(30)).await;

        // then (期待する結果):
        let flushed = rx.recv().await.unwrap();
        assert!(flushed.is_batch());
        assert_eq!(ids(&flushed), vec!["t0", "t1", "t2"]);
        assert!(rx.try_recv().is_err(), "exactly one flush");
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_message_is_flushed_unwrapped() {
        // テスト項目: 1 件だけのバッファはバッチで包まずにそのままフラッシュされる
        // given (前提条件):
        let (batcher, _queue, mut rx) = batcher(16);

        // when (操作):
        batcher.append(typing(0));
        tokio::time::sleep(Duration::from_millis(60)).await;

        // then (期待する結果):
        let flushed = rx.recv().await.unwrap();
        assert_eq!(flushed.kind, kind::TYPING);
        assert_eq!(flushed.message_id.as_deref(), Some("t0"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_size_flushes_immediately() {
        // テスト項目: 10 件に達した時点でタイマーを待たずに同期的にフラッシュされる
        // given (前提条件):
        let (batcher, _queue, mut rx) = batcher(16);

        // when (操作):
        for i in 0..10 {
            batcher.append(typing(i));
        }

        // then (期待する結果): 時間を進めずに受信できる
        let flushed = rx.try_recv().unwrap();
        assert_eq!(ids(&flushed).len(), 10);
        assert_eq!(batcher.pending(), 0);

        // 古いタイマーは取り消されており、追加のフラッシュは発生しない
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_after_flush_arms_fresh_timer() {
        // テスト項目: フラッシュ後の追加は新しいタイマーを起動する
        // given (前提条件):
        let (batcher, _queue, mut rx) = batcher(16);
        for i in 0..10 {
            batcher.append(typing(i));
        }
        let _ = rx.try_recv().unwrap();

        // when (操作):
        tokio::time::sleep(Duration::from_millis(40)).await;
        batcher.append(typing(10));
        batcher.append(typing(11));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // then (期待する結果): 前のタイマーの残り時間ではなく、新しい 50ms を待つ
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ids(&rx.recv().await.unwrap()), vec!["t10", "t11"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_flush_empties_buffer_and_cancels_timer() {
        // テスト項目: 強制フラッシュでバッファが空になり、タイマーによる重複フラッシュは起きない
        // given (前提条件):
        let (batcher, _queue, mut rx) = batcher(16);
        batcher.append(typing(0));
        batcher.append(typing(1));

        // when (操作):
        let flushed = batcher.force_flush();

        // then (期待する結果):
        assert_eq!(flushed, 2);
        assert_eq!(ids(&rx.try_recv().unwrap()), vec!["t0", "t1"]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(batcher.force_flush(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_into_full_queue_is_dropped() {
        // テスト項目: 送信キューが満杯ならフラッシュしたバッチも破棄される
        // given (前提条件):
        let (batcher, queue, _rx) = batcher(1);
        queue.try_send(Arc::new(typing(99)));

        // when (操作):
        batcher.append(typing(0));
        batcher.append(typing(1));
        batcher.force_flush();

        // then (期待する結果):
        assert_eq!(queue.dropped(), 1);
        assert_eq!(batcher.pending(), 0);
    }
}
