use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IngestResult;
use crate::queue::EventQueue;
use crate::types::{Event, EventContext, Record};

/// One line of a fallback log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEntry {
    /// The raw record as it was received.
    pub event: Record,
    pub error: String,
    pub event_id: Option<String>,
    pub source: String,
    pub destination_id: String,
    pub timestamp: DateTime<Utc>,
}

impl FallbackEntry {
    pub fn new(context: &EventContext, event: &Event, error: impl Into<String>) -> Self {
        Self {
            event: event.record.clone(),
            error: error.into(),
            event_id: context.event_id.clone(),
            source: event.source.clone(),
            destination_id: context.destination_id.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Returns the event this entry was written for.
    pub fn to_event(&self) -> Event {
        Event::new(self.event.clone(), self.source.clone())
    }
}

/// Trait for durable stores of permanently failed events.
pub trait FallbackLog {
    fn append(&self, entry: FallbackEntry) -> impl Future<Output = IngestResult<()>> + Send;
}

/// Enqueues the events of fallback entries again, returning how many were enqueued.
pub async fn replay<Q>(entries: Vec<FallbackEntry>, queue: &Q) -> IngestResult<usize>
where
    Q: EventQueue + Sync,
{
    let count = entries.len();
    for entry in entries {
        queue.enqueue(entry.to_event()).await?;
    }

    info!(count, "replayed fallback entries");

    Ok(count)
}
