use std::sync::Arc;

use anyhow::bail;
use ingest::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use ingest::coordination::memory::MemoryCoordinator;
use ingest::destination::Destination;
use ingest::destination::memory::MemoryDestination;
use ingest::fallback::file::FileFallbackLog;
use ingest::fallback::{FallbackEntry, FallbackLog};
use ingest::processing::processor::Processor;
use ingest::queue::EventQueue;
use ingest::queue::memory::MemoryQueue;
use ingest::schema::table_helper::TableHelper;
use ingest::types::{Event, EventContext};
use ingest::workers::pool::StreamingWorkerPool;
use ingest::workers::streaming::StreamingWorker;
use ingest_config::shared::{DestinationConfig, DestinationKind, ServerConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

/// Source tag of events read from standard input.
const STDIN_SOURCE: &str = "stdin";

/// Queue, fallback log and destination of one configured destination.
struct DestinationRuntime {
    config: Arc<DestinationConfig>,
    queue: MemoryQueue,
    fallback: FileFallbackLog,
    destination: MemoryDestination,
}

/// Starts the ingestion server with the provided configuration.
///
/// One streaming worker is started per destination. Newline-delimited JSON events read from
/// standard input are fanned out to every destination queue. The server stops once standard
/// input is exhausted and every queue is drained, or when SIGINT or SIGTERM is received.
pub async fn start_server_with_config(server_config: ServerConfig) -> anyhow::Result<()> {
    info!("starting ingest server");

    log_config(&server_config);

    let coordinator = MemoryCoordinator::new();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pool = StreamingWorkerPool::new();

    let mut runtimes = Vec::with_capacity(server_config.destinations.len());
    for destination_config in server_config.destinations {
        let config = Arc::new(destination_config);

        let destination = build_destination(&config)?;

        let runtime = DestinationRuntime {
            queue: MemoryQueue::new(),
            fallback: FileFallbackLog::open(&server_config.fallback.directory, &config.id).await?,
            destination,
            config,
        };

        let worker = StreamingWorker::new(
            runtime.config.clone(),
            Processor::new(&runtime.config)?,
            runtime.queue.clone(),
            TableHelper::new(
                &runtime.config,
                runtime.destination.clone(),
                coordinator.clone(),
            ),
            runtime.fallback.clone(),
            shutdown_rx.clone(),
        );
        pool.start(worker).await?;

        runtimes.push(runtime);
    }

    let queues: Vec<MemoryQueue> = runtimes.iter().map(|runtime| runtime.queue.clone()).collect();
    let reader_handle = tokio::spawn(read_events(queues));
    let signal_handle = tokio::spawn(wait_for_signal(shutdown_tx));

    pool.wait_all().await?;

    reader_handle.abort();
    signal_handle.abort();

    for runtime in &runtimes {
        persist_unconsumed_events(&runtime.config.id, &runtime.queue, &runtime.fallback).await?;
        runtime.destination.shutdown().await?;
    }

    info!("ingest server completed");

    Ok(())
}

/// Reads newline-delimited JSON events from standard input into every queue.
///
/// Lines that are not JSON objects are logged and dropped. Queues are closed once the input is
/// exhausted.
async fn read_events(queues: Vec<MemoryQueue>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let parsed = serde_json::from_str::<serde_json::Value>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|value| Event::from_json(value, STDIN_SOURCE).map_err(anyhow::Error::from));
        let event = match parsed {
            Ok(event) => event,
            Err(err) => {
                warn!(line_number, error = %err, "dropping malformed input line");
                continue;
            }
        };

        for queue in &queues {
            queue.enqueue(event.clone()).await?;
        }
    }

    info!(lines = line_number, "standard input exhausted, closing queues");
    for queue in &queues {
        queue.close().await?;
    }

    Ok(())
}

/// Triggers the shutdown on SIGINT or SIGTERM.
async fn wait_for_signal(shutdown_tx: ShutdownTx) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("sigint (ctrl+c) received, shutting down ingest server");
        }
        _ = sigterm.recv() => {
            info!("sigterm received, shutting down ingest server");
        }
    }

    if let Err(err) = shutdown_tx.shutdown() {
        warn!(error = %err, "failed to send shutdown signal");
    }

    Ok(())
}

/// Builds the destination adapter of a configured destination.
///
/// Destination adapters for external engines are provided by the deployment, this binary only
/// ships the in-memory one and no events cache backend.
fn build_destination(config: &DestinationConfig) -> anyhow::Result<MemoryDestination> {
    if config.kind != DestinationKind::Memory {
        bail!(
            "destination `{}` has kind `{}` which has no adapter in this server",
            config.id,
            config.kind.as_str()
        );
    }

    if config.events_cache.enabled {
        bail!(
            "destination `{}` enables the events cache which this server does not provide, \
             set `events_cache.enabled: false`",
            config.id
        );
    }

    Ok(MemoryDestination::new())
}

/// Writes the events left in a queue to the fallback log so they can be replayed.
///
/// Covers events that were never dequeued as well as events waiting for a retry.
async fn persist_unconsumed_events<F>(
    destination_id: &str,
    queue: &MemoryQueue,
    fallback: &F,
) -> anyhow::Result<usize>
where
    F: FallbackLog,
{
    let unconsumed = queue.drain();
    if unconsumed.is_empty() {
        return Ok(0);
    }

    warn!(
        %destination_id,
        count = unconsumed.len(),
        "persisting events left in the queue"
    );

    let count = unconsumed.len();
    for queued in unconsumed {
        let context = EventContext {
            destination_id: destination_id.to_string(),
            event_id: None,
            source: queued.event.source.clone(),
        };
        let reason = match queued.retry_at {
            Some(_) => "server stopped while the event was scheduled for retry",
            None => "server stopped before the event was processed",
        };

        fallback
            .append(FallbackEntry::new(&context, &queued.event, reason))
            .await?;
    }

    Ok(count)
}

fn log_config(config: &ServerConfig) {
    debug!(
        fallback_directory = %config.fallback.directory.display(),
        destinations = config.destinations.len(),
        "server config"
    );

    for destination in &config.destinations {
        debug!(
            destination_id = %destination.id,
            kind = destination.kind.as_str(),
            staging = destination.staging,
            table_name_template = %destination.table_name_template,
            retry_delay_ms = destination.retry_delay_ms,
            break_on_error = destination.break_on_error,
            "destination config"
        );
    }

    if config
        .destinations
        .iter()
        .all(|destination| destination.staging)
    {
        warn!("every destination is staging only, no event will be consumed");
    }
}
