use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::IngestResult;
use crate::types::Event;

/// An event drawn from an [`EventQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub event: Event,
    /// Time before which the event must not be processed, set for retried events.
    pub retry_at: Option<DateTime<Utc>>,
}

impl QueuedEvent {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            retry_at: None,
        }
    }

    pub fn retry_at(event: Event, at: DateTime<Utc>) -> Self {
        Self {
            event,
            retry_at: Some(at),
        }
    }

    /// Returns `true` if the event must not be processed before a time later than `now`.
    pub fn is_early(&self, now: DateTime<Utc>) -> bool {
        self.retry_at.is_some_and(|at| at > now)
    }
}

/// Trait for queues consumed by streaming workers.
///
/// Events enqueued with a time become eligible at or after that time. Retried events carry no
/// ordering guarantee relative to other events.
pub trait EventQueue {
    /// Adds an event that is eligible immediately.
    fn enqueue(&self, event: Event) -> impl Future<Output = IngestResult<()>> + Send;

    /// Adds an event that becomes eligible at `at`.
    fn enqueue_at(
        &self,
        event: Event,
        at: DateTime<Utc>,
    ) -> impl Future<Output = IngestResult<()>> + Send;

    /// Waits for the next eligible event.
    ///
    /// Returns `None` once the queue is closed and no eligible event is left.
    fn dequeue(&self) -> impl Future<Output = IngestResult<Option<QueuedEvent>>> + Send;

    /// Stops accepting events and wakes up waiting consumers.
    fn close(&self) -> impl Future<Output = IngestResult<()>> + Send;
}
