use std::fmt;

use crate::types::{EventContext, Record};

/// Sink for the outcome of processed events.
///
/// Calls must not block: implementations backed by a remote store are expected to buffer.
pub trait EventsCache: fmt::Debug {
    /// Records that `record` was written to the destination.
    fn succeed(&self, context: &EventContext, record: &Record);

    /// Records that the event failed permanently.
    fn error(&self, context: &EventContext, error: &str);

    /// Records that the event was skipped.
    fn skip(&self, context: &EventContext, reason: &str);
}
