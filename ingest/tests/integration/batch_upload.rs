use std::sync::Arc;

use ingest::coordination::memory::MemoryCoordinator;
use ingest::destination::memory::MemoryDestination;
use ingest::error::ErrorKind;
use ingest::events::memory::MemoryEventsCache;
use ingest::fallback::memory::MemoryFallbackLog;
use ingest::processing::processor::Processor;
use ingest::schema::table_helper::TableHelper;
use ingest::test_utils::faulty_destination::{DestinationOperation, FaultyDestination};
use ingest::types::{Event, Value};
use ingest::workers::batch::{BatchUploader, UploadSummary};
use ingest_config::shared::{DestinationConfig, FieldType};
use ingest_telemetry::init_test_tracing;
use serde_json::json;

use crate::{CopyToAudit, memory_config, page_view, shared};

type Uploader =
    BatchUploader<FaultyDestination<MemoryDestination>, MemoryCoordinator, MemoryFallbackLog>;

struct Harness {
    uploader: Uploader,
    destination: FaultyDestination<MemoryDestination>,
    fallback: MemoryFallbackLog,
    events_cache: MemoryEventsCache,
}

fn harness(config: DestinationConfig) -> Harness {
    harness_with(config, |processor| processor)
}

fn harness_with(
    config: DestinationConfig,
    customize: impl FnOnce(Processor) -> Processor,
) -> Harness {
    let config = shared(config);
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    let fallback = MemoryFallbackLog::new();
    let events_cache = MemoryEventsCache::new();

    let uploader = BatchUploader::new(
        config.clone(),
        customize(Processor::new(&config).unwrap()),
        TableHelper::new(&config, destination.clone(), MemoryCoordinator::new()),
        fallback.clone(),
    )
    .with_events_cache(Arc::new(events_cache.clone()));

    Harness {
        uploader,
        destination,
        fallback,
        events_cache,
    }
}

fn typed_event(id: u64, event_type: &str) -> Event {
    Event::from_json(
        json!({"event_id": format!("e{id}"), "event_type": event_type, "amount": id}),
        "batch",
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_are_bulk_inserted_per_table() {
    init_test_tracing();

    let mut config = memory_config("mem");
    config.table_name_template = "{{ .event_type }}".to_string();
    let harness = harness(config);

    let events = vec![
        typed_event(1, "click"),
        typed_event(2, "view"),
        typed_event(3, "click"),
        Event::from_json(json!({"event_id": "e4"}), "batch").unwrap(),
    ];
    let summary = harness.uploader.upload(&events).await.unwrap();

    assert_eq!(
        summary,
        UploadSummary {
            succeeded: 3,
            failed: 0,
            skipped: 1,
            tables: 2,
        }
    );
    assert_eq!(
        harness
            .destination
            .calls(DestinationOperation::BulkInsert),
        2
    );

    let clicks = harness.destination.wrapped().rows("click").await;
    assert_eq!(clicks.len(), 2);
    assert_eq!(clicks[1]["amount"], Value::Int(3));
    assert_eq!(harness.destination.wrapped().rows("view").await.len(), 1);

    assert_eq!(harness.events_cache.succeeded().len(), 3);
    assert_eq!(harness.events_cache.skipped().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_tables_route_every_row_to_the_fallback_log() {
    init_test_tracing();

    let harness = harness(memory_config("mem"));
    harness.destination.fail(
        DestinationOperation::BulkInsert,
        ErrorKind::DestinationQueryFailed,
        None,
    );

    let events: Vec<Event> = (0..10).map(page_view).collect();
    let summary = harness.uploader.upload(&events).await.unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 10);

    let entries = harness.fallback.entries().await;
    assert_eq!(entries.len(), 10);
    assert!(
        entries
            .iter()
            .zip(&events)
            .all(|(entry, event)| entry.event == event.record)
    );
    assert!(harness.events_cache.succeeded().is_empty());
    assert_eq!(harness.events_cache.failed().len(), 10);
    assert_eq!(harness.destination.wrapped().row_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn events_split_across_failing_tables_are_written_to_the_fallback_log_once() {
    init_test_tracing();

    let mut config = memory_config("mem");
    config.table_name_template = "{{ .event_type }}".to_string();
    let harness = harness_with(config, |processor| {
        processor.with_transformer(Arc::new(CopyToAudit))
    });
    harness.destination.fail(
        DestinationOperation::BulkInsert,
        ErrorKind::DestinationQueryFailed,
        None,
    );

    let events = vec![typed_event(1, "click"), typed_event(2, "view")];
    let summary = harness.uploader.upload(&events).await.unwrap();

    assert_eq!(summary.tables, 3);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 2);

    let entries = harness.fallback.entries().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].event_id.as_deref(), Some("e1"));
    assert_eq!(entries[1].event_id.as_deref(), Some("e2"));
    // Both tables of an event failed, the entry carries both errors.
    assert!(entries.iter().all(|entry| entry.error.contains("; ")));

    assert_eq!(harness.events_cache.failed().len(), 2);
    assert!(harness.events_cache.succeeded().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn processing_failures_are_isolated_by_default() {
    init_test_tracing();

    let mut config = memory_config("mem");
    config
        .default_types
        .insert("amount".to_string(), FieldType::Int64);
    let harness = harness(config);

    let broken = Event::from_json(json!({"event_id": "bad", "amount": "lots"}), "batch").unwrap();
    let events = vec![typed_event(1, "click"), broken, typed_event(2, "click")];
    let summary = harness.uploader.upload(&events).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let entries = harness.fallback.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_id.as_deref(), Some("bad"));
    assert_eq!(harness.destination.wrapped().rows("events").await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn break_on_error_aborts_the_upload() {
    init_test_tracing();

    let mut config = memory_config("mem");
    config.break_on_error = true;
    config
        .default_types
        .insert("amount".to_string(), FieldType::Int64);
    let harness = harness(config);

    let broken = Event::from_json(json!({"event_id": "bad", "amount": "lots"}), "batch").unwrap();
    let events = vec![typed_event(1, "click"), broken];
    let err = harness.uploader.upload(&events).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConversionError);
    assert_eq!(harness.destination.wrapped().row_count().await, 0);
    assert!(harness.fallback.entries().await.is_empty());
}
