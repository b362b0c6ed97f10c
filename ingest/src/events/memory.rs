use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::EventsCache;
use crate::types::{EventContext, Record};

/// Outcome of an event recorded in a [`MemoryEventsCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventStatus {
    Succeeded(Record),
    Failed(String),
    Skipped(String),
}

/// Entry of a [`MemoryEventsCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEvent {
    pub context: EventContext,
    pub status: EventStatus,
}

/// In-process [`EventsCache`] keeping every entry.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventsCache {
    entries: Arc<Mutex<Vec<CachedEvent>>>,
}

impl MemoryEventsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CachedEvent> {
        self.entries.lock().clone()
    }

    pub fn succeeded(&self) -> Vec<CachedEvent> {
        self.filter(|status| matches!(status, EventStatus::Succeeded(_)))
    }

    pub fn failed(&self) -> Vec<CachedEvent> {
        self.filter(|status| matches!(status, EventStatus::Failed(_)))
    }

    pub fn skipped(&self) -> Vec<CachedEvent> {
        self.filter(|status| matches!(status, EventStatus::Skipped(_)))
    }

    fn filter(&self, predicate: impl Fn(&EventStatus) -> bool) -> Vec<CachedEvent> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| predicate(&entry.status))
            .cloned()
            .collect()
    }

    fn push(&self, context: &EventContext, status: EventStatus) {
        self.entries.lock().push(CachedEvent {
            context: context.clone(),
            status,
        });
    }
}

impl EventsCache for MemoryEventsCache {
    fn succeed(&self, context: &EventContext, record: &Record) {
        self.push(context, EventStatus::Succeeded(record.clone()));
    }

    fn error(&self, context: &EventContext, error: &str) {
        self.push(context, EventStatus::Failed(error.to_string()));
    }

    fn skip(&self, context: &EventContext, reason: &str) {
        self.push(context, EventStatus::Skipped(reason.to_string()));
    }
}
