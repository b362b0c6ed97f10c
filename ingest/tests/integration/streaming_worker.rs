use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use ingest::concurrency::shutdown::{ShutdownRx, create_shutdown_channel};
use ingest::coordination::memory::MemoryCoordinator;
use ingest::destination::Destination;
use ingest::destination::memory::MemoryDestination;
use ingest::error::ErrorKind;
use ingest::events::memory::{EventStatus, MemoryEventsCache};
use ingest::fallback::file::{FileFallbackLog, read_entries};
use ingest::fallback::memory::MemoryFallbackLog;
use ingest::fallback::{FallbackLog, replay};
use ingest::processing::processor::Processor;
use ingest::queue::memory::MemoryQueue;
use ingest::queue::{EventQueue, QueuedEvent};
use ingest::schema::table_helper::TableHelper;
use ingest::test_utils::faulty_destination::{DestinationOperation, FaultyDestination};
use ingest::test_utils::scripted_queue::ScriptedQueue;
use ingest::types::{Event, Value};
use ingest::workers::pool::StreamingWorkerPool;
use ingest::workers::streaming::StreamingWorker;
use ingest_config::shared::{DestinationConfig, DestinationKind};
use ingest_telemetry::init_test_tracing;
use serde_json::json;

use crate::{CopyToAudit, memory_config, page_view, shared};

fn streaming_worker<Q, D, F>(
    config: &Arc<DestinationConfig>,
    queue: Q,
    destination: D,
    fallback: F,
    shutdown_rx: ShutdownRx,
) -> StreamingWorker<Q, D, MemoryCoordinator, F>
where
    Q: EventQueue + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
    F: FallbackLog + Clone + Send + Sync + 'static,
{
    StreamingWorker::new(
        config.clone(),
        Processor::new(config).unwrap(),
        queue,
        TableHelper::new(config, destination, MemoryCoordinator::new()),
        fallback,
        shutdown_rx,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_events_are_written_as_flat_rows() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let queue = MemoryQueue::new();
    let destination = MemoryDestination::new();
    let fallback = MemoryFallbackLog::new();
    let events_cache = MemoryEventsCache::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    for id in 0..3 {
        queue.enqueue(page_view(id)).await.unwrap();
    }
    queue.close().await.unwrap();

    let pool = StreamingWorkerPool::new();
    pool.start(
        streaming_worker(
            &config,
            queue,
            destination.clone(),
            fallback.clone(),
            shutdown_rx,
        )
        .with_events_cache(Arc::new(events_cache.clone())),
    )
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    let rows = destination.rows("events").await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["user_id"], Value::Int(1));
    assert_eq!(rows[1]["user_country"], Value::String("DE".to_string()));
    assert!(matches!(rows[1]["_timestamp"], Value::Timestamp(_)));
    assert!(!rows[1].contains_key("user"));

    let succeeded = events_cache.succeeded();
    assert_eq!(succeeded.len(), 3);
    assert_eq!(succeeded[2].context.event_id.as_deref(), Some("e2"));
    assert_eq!(succeeded[2].context.source, "api");
    assert!(fallback.entries().await.is_empty());

    let stats = pool.states()["mem"];
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_failed_insert_lands_in_the_fallback_log() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let queue = MemoryQueue::new();
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    destination.fail(
        DestinationOperation::Insert,
        ErrorKind::DestinationQueryFailed,
        None,
    );
    let fallback = MemoryFallbackLog::new();
    let events_cache = MemoryEventsCache::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    for id in 0..5 {
        queue.enqueue(page_view(id)).await.unwrap();
    }
    queue.close().await.unwrap();

    let pool = StreamingWorkerPool::new();
    pool.start(
        streaming_worker(
            &config,
            queue,
            destination.clone(),
            fallback.clone(),
            shutdown_rx,
        )
        .with_events_cache(Arc::new(events_cache.clone())),
    )
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    let entries = fallback.entries().await;
    assert_eq!(entries.len(), 5);
    for (id, entry) in entries.iter().enumerate() {
        assert_eq!(entry.event_id, Some(format!("e{id}")));
        assert_eq!(entry.event, page_view(id as u64).record);
        assert_eq!(entry.destination_id, "mem");
        assert!(entry.error.starts_with("Injected destination failure"));
    }

    assert!(events_cache.succeeded().is_empty());
    assert_eq!(events_cache.failed().len(), 5);
    assert!(matches!(
        &events_cache.failed()[0].status,
        EventStatus::Failed(error) if error.contains("Insert")
    ));
    assert_eq!(destination.wrapped().row_count().await, 0);
    assert_eq!(pool.states()["mem"].failed, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_failures_are_retried_after_the_configured_delay() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let queue = MemoryQueue::new();
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    destination.fail(
        DestinationOperation::Insert,
        ErrorKind::DestinationConnectionFailed,
        Some(1),
    );
    let fallback = MemoryFallbackLog::new();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    queue.enqueue(page_view(1)).await.unwrap();
    let second_insert = destination.notify_on_calls(DestinationOperation::Insert, 2);

    let started = Instant::now();
    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        queue,
        destination.clone(),
        fallback.clone(),
        shutdown_rx,
    ))
    .await
    .unwrap();

    second_insert.notified().await;
    assert!(started.elapsed() >= Duration::from_millis(config.retry_delay_ms));

    // The in-flight insert completes before the worker observes the shutdown.
    shutdown_tx.shutdown().unwrap();
    pool.wait_all().await.unwrap();

    assert_eq!(destination.wrapped().rows("events").await.len(), 1);
    assert!(fallback.entries().await.is_empty());

    let stats = pool.states()["mem"];
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn early_retry_entries_are_put_back_without_processing() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let retry_at = Utc::now() + TimeDelta::hours(1);
    let queue = ScriptedQueue::new([
        QueuedEvent::retry_at(page_view(1), retry_at),
        QueuedEvent::new(page_view(2)),
    ]);
    let destination = MemoryDestination::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        queue.clone(),
        destination.clone(),
        MemoryFallbackLog::new(),
        shutdown_rx,
    ))
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    assert_eq!(
        queue.enqueued(),
        vec![QueuedEvent::retry_at(page_view(1), retry_at)]
    );

    let rows = destination.rows("events").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["event_id"], Value::String("e2".to_string()));

    let stats = pool.states()["mem"];
    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn staging_destinations_never_consume() {
    init_test_tracing();

    let mut config = memory_config("staging");
    config.staging = true;
    let config = shared(config);
    let queue = MemoryQueue::new();
    queue.enqueue(page_view(1)).await.unwrap();
    let destination = MemoryDestination::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        queue.clone(),
        destination.clone(),
        MemoryFallbackLog::new(),
        shutdown_rx,
    ))
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    assert_eq!(queue.ready_len(), 1);
    assert_eq!(destination.row_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_an_idle_worker() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let queue = MemoryQueue::new();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        queue.clone(),
        MemoryDestination::new(),
        MemoryFallbackLog::new(),
        shutdown_rx,
    ))
    .await
    .unwrap();

    shutdown_tx.shutdown().unwrap();
    pool.wait_all().await.unwrap();

    // The queue stays usable for whoever takes over.
    assert!(!queue.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn records_without_table_name_are_skipped() {
    init_test_tracing();

    let mut config = memory_config("mem");
    config.table_name_template = "{{ .event_type }}".to_string();
    let config = shared(config);
    let queue = MemoryQueue::new();
    let destination = MemoryDestination::new();
    let events_cache = MemoryEventsCache::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    queue.enqueue(page_view(1)).await.unwrap();
    let mut anonymous = page_view(2);
    anonymous.record.remove("event_type");
    queue.enqueue(anonymous).await.unwrap();
    queue.close().await.unwrap();

    let pool = StreamingWorkerPool::new();
    pool.start(
        streaming_worker(
            &config,
            queue,
            destination.clone(),
            MemoryFallbackLog::new(),
            shutdown_rx,
        )
        .with_events_cache(Arc::new(events_cache.clone())),
    )
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    assert_eq!(destination.rows("page_view").await.len(), 1);

    let skipped = events_cache.skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].context.event_id.as_deref(), Some("e2"));
    assert_eq!(pool.states()["mem"].skipped, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fallback_file_can_be_replayed_once_the_destination_recovers() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let directory = std::env::temp_dir().join(format!("ingest-replay-{}", uuid::Uuid::new_v4()));
    let fallback = FileFallbackLog::open(&directory, "mem").await.unwrap();
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    destination.fail(
        DestinationOperation::Insert,
        ErrorKind::DestinationSchemaError,
        None,
    );

    let queue = MemoryQueue::new();
    queue.enqueue(page_view(1)).await.unwrap();
    queue.enqueue(page_view(2)).await.unwrap();
    queue.close().await.unwrap();

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        queue,
        destination.clone(),
        fallback.clone(),
        shutdown_rx,
    ))
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    let entries = read_entries(fallback.path()).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].to_event(), page_view(1));

    destination.heal();
    let replay_queue = MemoryQueue::new();
    assert_eq!(replay(entries, &replay_queue).await.unwrap(), 2);
    replay_queue.close().await.unwrap();

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        replay_queue,
        destination.clone(),
        fallback.clone(),
        shutdown_rx,
    ))
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    assert_eq!(destination.wrapped().rows("events").await.len(), 2);

    tokio::fs::remove_dir_all(&directory).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn split_events_fail_as_a_whole_and_once() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let queue = MemoryQueue::new();
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    // Only the first of the two rows fails.
    destination.fail(
        DestinationOperation::Insert,
        ErrorKind::DestinationQueryFailed,
        Some(1),
    );
    let fallback = MemoryFallbackLog::new();
    let events_cache = MemoryEventsCache::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    queue.enqueue(page_view(1)).await.unwrap();
    queue.close().await.unwrap();

    let worker = StreamingWorker::new(
        config.clone(),
        Processor::new(&config)
            .unwrap()
            .with_transformer(Arc::new(CopyToAudit)),
        queue,
        TableHelper::new(&config, destination.clone(), MemoryCoordinator::new()),
        fallback.clone(),
        shutdown_rx,
    )
    .with_events_cache(Arc::new(events_cache.clone()));

    let pool = StreamingWorkerPool::new();
    pool.start(worker).await.unwrap();
    pool.wait_all().await.unwrap();

    assert_eq!(destination.calls(DestinationOperation::Insert), 2);
    assert_eq!(destination.wrapped().rows("audit").await.len(), 1);

    let entries = fallback.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, page_view(1).record);

    assert_eq!(events_cache.failed().len(), 1);
    assert!(events_cache.succeeded().is_empty());

    let stats = pool.states()["mem"];
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn retried_events_keep_their_stamped_id() {
    init_test_tracing();

    let mut config = DestinationConfig::new("pg", DestinationKind::Postgres);
    config.retry_delay_ms = u64::MAX;
    let config = shared(config);
    let raw = Event::from_json(json!({"a": 1}), "api").unwrap();
    let queue = ScriptedQueue::new([QueuedEvent::new(raw)]);
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    destination.fail(
        DestinationOperation::Insert,
        ErrorKind::DestinationConnectionFailed,
        None,
    );
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        queue.clone(),
        destination.clone(),
        MemoryFallbackLog::new(),
        shutdown_rx,
    ))
    .await
    .unwrap();
    pool.wait_all().await.unwrap();

    let enqueued = queue.enqueued();
    assert_eq!(enqueued.len(), 1);
    assert!(matches!(enqueued[0].event.record["event_id"], Value::String(_)));

    // The delay is capped instead of overflowing.
    let retry_at = enqueued[0].retry_at.unwrap();
    assert!(retry_at <= Utc::now() + TimeDelta::days(1));
    assert!(retry_at > Utc::now() + TimeDelta::hours(23));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_workers_are_rejected_before_they_consume() {
    init_test_tracing();

    let config = shared(memory_config("mem"));
    let queue = MemoryQueue::new();
    let duplicate_queue = MemoryQueue::new();
    let destination = MemoryDestination::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let pool = StreamingWorkerPool::new();
    pool.start(streaming_worker(
        &config,
        queue.clone(),
        destination.clone(),
        MemoryFallbackLog::new(),
        shutdown_rx.clone(),
    ))
    .await
    .unwrap();

    let err = pool
        .start(streaming_worker(
            &config,
            duplicate_queue.clone(),
            destination.clone(),
            MemoryFallbackLog::new(),
            shutdown_rx,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    duplicate_queue.enqueue(page_view(1)).await.unwrap();
    queue.close().await.unwrap();
    pool.wait_all().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(duplicate_queue.ready_len(), 1);
    assert_eq!(destination.row_count().await, 0);
    assert_eq!(pool.states().len(), 1);
}
