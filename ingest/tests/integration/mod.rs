#![cfg(feature = "test-utils")]

use std::sync::Arc;

use ingest::error::IngestResult;
use ingest::processing::transform::{TransformOutcome, TransformedRecord, Transformer};
use ingest::types::{Event, Record};
use ingest_config::shared::{DestinationConfig, DestinationKind};
use serde_json::json;

mod batch_upload;
mod streaming_worker;
mod table_helper;

/// Configuration of an in-memory destination writing every record to the `events` table.
pub fn memory_config(id: &str) -> DestinationConfig {
    let mut config = DestinationConfig::new(id, DestinationKind::Memory);
    config.retry_delay_ms = 50;
    config
}

pub fn shared(config: DestinationConfig) -> Arc<DestinationConfig> {
    Arc::new(config)
}

/// A page view event with the given id.
pub fn page_view(id: u64) -> Event {
    Event::from_json(
        json!({
            "event_id": format!("e{id}"),
            "event_type": "page_view",
            "user": {"id": id, "country": "DE"},
            "_timestamp": "2024-05-01T10:00:00Z"
        }),
        "api",
    )
    .unwrap()
}

/// Keeps every record and routes a copy of it to the `audit` table.
#[derive(Debug)]
pub struct CopyToAudit;

impl Transformer for CopyToAudit {
    fn transform(&self, record: Record) -> IngestResult<TransformOutcome> {
        Ok(TransformOutcome::Records(vec![
            TransformedRecord::new(record.clone()),
            TransformedRecord::new(record).with_table_name("audit"),
        ]))
    }
}
