//! Bounded per-symbol ingest queues
//!
//! Each partition worker consumes one queue. Submitting never blocks:
//! - Market events count against the queue capacity; when it is full the
//!   oldest queued event is dropped to make room and the push reports it
//! - Control commands (watermark, flush, restart, barriers) are never
//!   dropped and do not count against the capacity
//!
//! Suspension happens only here, in [`PartitionQueue::pop_batch`], never
//! inside the accumulator logic.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Notify};

use crate::events::MarketEvent;

/// Work item for a partition worker.
#[derive(Debug)]
pub enum Command {
    Event(MarketEvent),
    AdvanceWatermark(i64),
    Flush,
    Restart,
    /// Completed once every earlier command is applied and published.
    Barrier(oneshot::Sender<()>),
}

impl Command {
    fn is_event(&self) -> bool {
        matches!(self, Command::Event(_))
    }
}

/// Result of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest queued event.
    Displaced,
}

/// The queue was closed; the partition is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Command>,
    queued_events: usize,
    dropped: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct PartitionQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl PartitionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, command: Command) -> Result<PushOutcome, QueueClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueClosed);
        }

        let mut outcome = PushOutcome::Queued;
        if command.is_event() {
            if state.queued_events >= self.capacity {
                if let Some(oldest) = state.items.iter().position(Command::is_event) {
                    state.items.remove(oldest);
                    state.queued_events -= 1;
                    state.dropped += 1;
                    outcome = PushOutcome::Displaced;
                }
            }
            state.queued_events += 1;
        }
        state.items.push_back(command);
        drop(state);

        self.notify.notify_one();
        Ok(outcome)
    }

    /// Wait for work and take up to `max` commands in FIFO order. Returns
    /// `None` once the queue is closed and drained.
    pub async fn pop_batch(&self, max: usize) -> Option<Vec<Command>> {
        loop {
            {
                let mut state = self.lock();
                if !state.items.is_empty() {
                    let take = max.max(1).min(state.items.len());
                    let batch: Vec<Command> = state.items.drain(..take).collect();
                    let events = batch.iter().filter(|c| c.is_event()).count();
                    state.queued_events -= events;
                    return Some(batch);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Refuse further pushes. Queued commands are still delivered.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events evicted over the queue's lifetime.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::ids::Symbol;
    use types::trade::{Side, Tick};

    fn event(ts: i64) -> Command {
        Command::Event(
            Tick::new(Symbol::new("BTC-USD"), ts, Decimal::ONE, Decimal::ONE, Side::BUY).into(),
        )
    }

    fn timestamps(batch: &[Command]) -> Vec<i64> {
        batch
            .iter()
            .filter_map(|c| match c {
                Command::Event(e) => Some(e.timestamp()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fifo_batches() {
        let queue = PartitionQueue::new(10);
        for ts in 0..5 {
            assert_eq!(queue.push(event(ts)), Ok(PushOutcome::Queued));
        }
        let batch = queue.pop_batch(3).await.unwrap();
        assert_eq!(timestamps(&batch), vec![0, 1, 2]);
        let batch = queue.pop_batch(10).await.unwrap();
        assert_eq!(timestamps(&batch), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_drop_oldest_on_overflow() {
        let queue = PartitionQueue::new(2);
        queue.push(event(0)).unwrap();
        queue.push(event(1)).unwrap();
        assert_eq!(queue.push(event(2)), Ok(PushOutcome::Displaced));
        assert_eq!(queue.dropped(), 1);

        let batch = queue.pop_batch(10).await.unwrap();
        assert_eq!(timestamps(&batch), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_control_commands_never_dropped() {
        let queue = PartitionQueue::new(1);
        queue.push(Command::Flush).unwrap();
        queue.push(event(0)).unwrap();
        assert_eq!(queue.push(event(1)), Ok(PushOutcome::Displaced));
        queue.push(Command::Restart).unwrap();

        let batch = queue.pop_batch(10).await.unwrap();
        assert!(matches!(batch[0], Command::Flush));
        assert_eq!(timestamps(&batch), vec![1]);
        assert!(matches!(batch[2], Command::Restart));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = PartitionQueue::new(4);
        queue.push(event(0)).unwrap();
        queue.close();
        assert_eq!(queue.push(event(1)), Err(QueueClosed));
        assert_eq!(queue.pop_batch(10).await.map(|b| b.len()), Some(1));
        assert!(queue.pop_batch(10).await.is_none());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = std::sync::Arc::new(PartitionQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_batch(10).await })
        };
        tokio::task::yield_now().await;
        queue.push(event(7)).unwrap();
        let batch = consumer.await.unwrap().unwrap();
        assert_eq!(timestamps(&batch), vec![7]);
    }
}
