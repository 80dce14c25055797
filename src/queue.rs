//! Event Queue - bounded FIFO between a source and the dispatch loop.
//!
//! [`EventQueue::bounded`] returns the two halves of a bounded channel: a
//! cloneable [`EventSink`] handed to event sources, and the single
//! [`EventQueue`] consumer owned by the dispatch loop. When the queue is full,
//! producers wait instead of dropping events, so backpressure reaches the
//! source.

use crate::event::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur when enqueueing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// The consumer half was dropped
    #[error("event queue is closed")]
    Closed,

    /// Only returned by [`EventSink::try_send`]
    #[error("event queue is full")]
    Full,
}

/// Producer half of the event queue.
///
/// All clones share one `accepted` counter. It is bumped only once a slot is
/// held for the event, immediately before the event is handed over, so it
/// never undercounts what the consumer will see and a cancelled send leaves
/// it untouched.
#[derive(Clone, Debug)]
pub struct EventSink {
    sender: mpsc::Sender<Arc<Event>>,
    accepted: Arc<AtomicU64>,
}

impl EventSink {
    /// Enqueue an event, waiting for space if the queue is full.
    pub async fn send(&self, event: impl Into<Arc<Event>>) -> Result<(), QueueError> {
        let permit = self.sender.reserve().await.map_err(|_| QueueError::Closed)?;
        self.accepted.fetch_add(1, Ordering::AcqRel);
        permit.send(event.into());
        Ok(())
    }

    /// Enqueue from synchronous code, blocking the current thread while full.
    ///
    /// Must not be called from inside an async runtime. The calling thread
    /// cannot abandon the send part way, so the counter is bumped up front
    /// and rolled back only if the queue is closed.
    pub fn blocking_send(&self, event: impl Into<Arc<Event>>) -> Result<(), QueueError> {
        self.accepted.fetch_add(1, Ordering::AcqRel);
        self.sender.blocking_send(event.into()).map_err(|_| {
            self.accepted.fetch_sub(1, Ordering::AcqRel);
            QueueError::Closed
        })
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, event: impl Into<Arc<Event>>) -> Result<(), QueueError> {
        self.accepted.fetch_add(1, Ordering::AcqRel);
        self.sender.try_send(event.into()).map_err(|e| {
            self.accepted.fetch_sub(1, Ordering::AcqRel);
            match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }
        })
    }

    /// Events handed to the queue so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Acquire)
    }

    /// Whether both sinks feed the same queue.
    pub fn same_queue(&self, other: &EventSink) -> bool {
        self.sender.same_channel(&other.sender)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Free slots right now.
    pub fn free_capacity(&self) -> usize {
        self.sender.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

/// Consumer half of the event queue.
#[derive(Debug)]
pub struct EventQueue {
    receiver: mpsc::Receiver<Arc<Event>>,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Configuration validation rejects that
    /// before a queue is ever built.
    pub fn bounded(capacity: usize) -> (EventSink, EventQueue) {
        let (sender, receiver) = mpsc::channel(capacity);
        let sink = EventSink {
            sender,
            accepted: Arc::new(AtomicU64::new(0)),
        };
        (sink, EventQueue { receiver })
    }

    /// Dequeue the oldest event, waiting while the queue is empty.
    ///
    /// Returns `None` once every sink is dropped and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
