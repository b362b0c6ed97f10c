use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, IngestResult};
use crate::types::{Record, Value};

/// Source tag used when an event does not carry one.
pub const DEFAULT_SOURCE: &str = "unknown";

/// One raw input record together with the tag of the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub record: Record,
    pub source: String,
}

impl Event {
    pub fn new(record: Record, source: impl Into<String>) -> Self {
        Self {
            record,
            source: source.into(),
        }
    }

    /// Builds an event from a JSON value, failing when the value is not an object.
    pub fn from_json(value: serde_json::Value, source: impl Into<String>) -> IngestResult<Self> {
        match Value::from(value) {
            Value::Object(record) => Ok(Self::new(record, source)),
            other => bail!(
                ErrorKind::InvalidData,
                "Event payload is not an object",
                format!("received a value of kind `{}`", other.kind_name())
            ),
        }
    }
}

/// Accounting context built for every event consumed by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub destination_id: String,
    pub event_id: Option<String>,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_object_payloads() {
        let err = Event::from_json(json!([1, 2]), "api").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let event = Event::from_json(json!({"a": 1}), "api").unwrap();
        assert_eq!(event.source, "api");
        assert_eq!(event.record.len(), 1);
    }

    #[test]
    fn record_keys_are_ordered_by_name() {
        let event = Event::from_json(json!({"zeta": 1, "alpha": 2, "mid": 3}), "api").unwrap();

        let keys: Vec<&str> = event.record.keys().map(String::as_str).collect();
        assert_eq!(keys, ["alpha", "mid", "zeta"]);
    }
}
