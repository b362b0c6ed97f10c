use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::IngestResult;
use crate::queue::{EventQueue, QueuedEvent};
use crate::types::Event;

#[derive(Debug, Default)]
struct Inner {
    script: VecDeque<QueuedEvent>,
    enqueued: Vec<QueuedEvent>,
    closed: bool,
}

/// [`EventQueue`] handing out a fixed script of entries and recording what is enqueued.
///
/// Enqueued events are never handed out. Once the script is exhausted the queue reports itself
/// closed and drained.
#[derive(Debug, Clone, Default)]
pub struct ScriptedQueue {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedQueue {
    pub fn new(script: impl IntoIterator<Item = QueuedEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                script: script.into_iter().collect(),
                ..Default::default()
            })),
        }
    }

    /// Returns the events enqueued so far, with their scheduled time for timed ones.
    pub fn enqueued(&self) -> Vec<QueuedEvent> {
        self.inner.lock().enqueued.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl EventQueue for ScriptedQueue {
    async fn enqueue(&self, event: Event) -> IngestResult<()> {
        self.inner.lock().enqueued.push(QueuedEvent::new(event));
        Ok(())
    }

    async fn enqueue_at(&self, event: Event, at: DateTime<Utc>) -> IngestResult<()> {
        self.inner
            .lock()
            .enqueued
            .push(QueuedEvent::retry_at(event, at));
        Ok(())
    }

    async fn dequeue(&self) -> IngestResult<Option<QueuedEvent>> {
        Ok(self.inner.lock().script.pop_front())
    }

    async fn close(&self) -> IngestResult<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}
