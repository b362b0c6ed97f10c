use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use ingest_config::shared::DestinationConfig;
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::coordination::Coordinator;
use crate::destination::Destination;
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::events::EventsCache;
use crate::fallback::{FallbackEntry, FallbackLog};
use crate::ingest_error;
use crate::metrics::{
    DESTINATION_ID_LABEL, ERROR_KIND_LABEL, INGEST_EVENTS_FAILED_TOTAL,
    INGEST_EVENTS_RETRIED_TOTAL, INGEST_EVENTS_SKIPPED_TOTAL, INGEST_EVENTS_SUCCEEDED_TOTAL,
    SOURCE_LABEL,
};
use crate::processing::processed::ProcessOutcome;
use crate::processing::processor::Processor;
use crate::queue::{EventQueue, QueuedEvent};
use crate::schema::table_helper::TableHelper;
use crate::types::{Envelope, Event, EventContext, Value};
use crate::workers::base::{DestinationWorker, Worker, WorkerHandle};
use crate::workers::policy::{RetryDirective, build_error_handling_policy};

/// Counters of a streaming worker, one increment per envelope or event outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamingWorkerStats {
    /// Rows written to the destination.
    pub succeeded: u64,
    /// Events written to the fallback log.
    pub failed: u64,
    /// Events that produced no rows.
    pub skipped: u64,
    /// Events enqueued again after a connection failure.
    pub retried: u64,
    /// Early events put back into the queue without processing.
    pub deferred: u64,
}

/// Handle of a running [`StreamingWorker`].
#[derive(Debug)]
pub struct StreamingWorkerHandle {
    destination_id: String,
    stats: Arc<Mutex<StreamingWorkerStats>>,
    handle: Option<JoinHandle<IngestResult<()>>>,
}

impl StreamingWorkerHandle {
    /// Wraps an already spawned task.
    #[cfg(test)]
    pub(crate) fn from_task(
        destination_id: impl Into<String>,
        task: JoinHandle<IngestResult<()>>,
    ) -> Self {
        Self {
            destination_id: destination_id.into(),
            stats: Arc::default(),
            handle: Some(task),
        }
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub(crate) fn shared_stats(&self) -> Arc<Mutex<StreamingWorkerStats>> {
        self.stats.clone()
    }
}

impl WorkerHandle<StreamingWorkerStats> for StreamingWorkerHandle {
    fn state(&self) -> StreamingWorkerStats {
        *self.stats.lock()
    }

    async fn wait(mut self) -> IngestResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            if err.is_cancelled() {
                ingest_error!(
                    ErrorKind::WorkerCancelled,
                    "Streaming worker was cancelled",
                    err
                )
            } else {
                ingest_error!(ErrorKind::WorkerPanic, "Streaming worker panicked", err)
            }
        })??;

        Ok(())
    }
}

/// Worker consuming the event queue of one destination.
///
/// Every event is processed on its own and each resulting row is written right away, evolving
/// the table schema first when needed. Rows failing with a connection error are retried later,
/// other failures go to the fallback log.
#[derive(Debug)]
pub struct StreamingWorker<Q, D, C, F> {
    config: Arc<DestinationConfig>,
    processor: Processor,
    queue: Q,
    table_helper: TableHelper<D, C>,
    fallback: F,
    events_cache: Option<Arc<dyn EventsCache + Send + Sync>>,
    shutdown_rx: ShutdownRx,
    stats: Arc<Mutex<StreamingWorkerStats>>,
}

impl<Q, D, C, F> StreamingWorker<Q, D, C, F>
where
    Q: EventQueue + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
    C: Coordinator + Clone + Send + Sync + 'static,
    F: FallbackLog + Clone + Send + Sync + 'static,
{
    pub fn new(
        config: Arc<DestinationConfig>,
        processor: Processor,
        queue: Q,
        table_helper: TableHelper<D, C>,
        fallback: F,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            processor,
            queue,
            table_helper,
            fallback,
            events_cache: None,
            shutdown_rx,
            stats: Arc::new(Mutex::new(StreamingWorkerStats::default())),
        }
    }

    /// Sets the events cache. It is only used when enabled in the destination configuration.
    pub fn with_events_cache(mut self, events_cache: Arc<dyn EventsCache + Send + Sync>) -> Self {
        self.events_cache = self.config.events_cache.enabled.then_some(events_cache);
        self
    }

    async fn run(mut self) -> IngestResult<()> {
        info!("starting streaming worker");

        loop {
            let queued = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutting down streaming worker");
                    break;
                }
                queued = self.queue.dequeue() => queued?,
            };

            let Some(queued) = queued else {
                info!("queue closed and drained, stopping streaming worker");
                break;
            };

            self.handle_event(queued).await?;
        }

        Ok(())
    }

    async fn handle_event(&self, queued: QueuedEvent) -> IngestResult<()> {
        if queued.is_early(Utc::now())
            && let Some(retry_at) = queued.retry_at
        {
            debug!(%retry_at, "event drawn before its retry time, deferring");
            self.queue.enqueue_at(queued.event, retry_at).await?;
            self.stats.lock().deferred += 1;
            return Ok(());
        }

        let mut event = queued.event;
        let stamped = self.processor.stamp_event_id(&mut event);
        let mut context = EventContext {
            destination_id: self.config.id.clone(),
            event_id: self.processor.extract_event_id(&event.record),
            source: event.source.clone(),
        };

        let envelopes = match stamped.and_then(|()| self.processor.process_event(&event)) {
            Ok(ProcessOutcome::Envelopes(envelopes)) => envelopes,
            Ok(ProcessOutcome::Skipped(reason)) => {
                debug!(event_id = ?context.event_id, %reason, "event skipped");
                counter!(
                    INGEST_EVENTS_SKIPPED_TOTAL,
                    DESTINATION_ID_LABEL => context.destination_id.clone(),
                    SOURCE_LABEL => context.source.clone()
                )
                .increment(1);
                self.stats.lock().skipped += 1;
                if let Some(events_cache) = &self.events_cache {
                    events_cache.skip(&context, &reason.to_string());
                }
                return Ok(());
            }
            Err(err) => return self.record_failure(&context, &event, &err).await,
        };

        if context.event_id.is_none() {
            context.event_id = envelopes.iter().find_map(|envelope| {
                envelope
                    .record
                    .get(self.processor.unique_id_column())
                    .map(Value::to_string)
            });
        }

        let mut written = Vec::with_capacity(envelopes.len());
        let mut errors = Vec::new();
        for envelope in envelopes {
            if !envelope.header.exists() {
                continue;
            }

            match self.write_envelope(&envelope).await {
                Ok(()) => {
                    self.record_written(&context);
                    written.push(envelope);
                }
                Err(err) => match build_error_handling_policy(&err).retry_directive() {
                    RetryDirective::Timed => {
                        // The whole event is retried, rows already written included.
                        return self.schedule_retry(&context, &event, &err).await;
                    }
                    RetryDirective::NoRetry => {
                        debug!(
                            event_id = ?context.event_id,
                            table_name = %envelope.header.table_name,
                            error = %err,
                            "row could not be written"
                        );
                        errors.push(err);
                    }
                },
            }
        }

        // An event is either failed as a whole, once, or succeeded with every row it produced.
        if !errors.is_empty() {
            return self
                .record_failure(&context, &event, &IngestError::from(errors))
                .await;
        }

        if let Some(events_cache) = &self.events_cache {
            for envelope in &written {
                events_cache.succeed(&context, &envelope.record);
            }
        }

        Ok(())
    }

    async fn write_envelope(&self, envelope: &Envelope) -> IngestResult<()> {
        let desired = self.table_helper.map_table_schema(&envelope.header);
        let table = self.table_helper.ensure_table(&desired).await?;

        self.table_helper
            .destination()
            .insert(&table, &envelope.record)
            .await
    }

    /// Configured retry delay, capped to the largest delay the configuration accepts.
    fn retry_delay(&self) -> TimeDelta {
        let delay_ms = self
            .config
            .retry_delay_ms
            .min(DestinationConfig::MAX_RETRY_DELAY_MS);

        TimeDelta::milliseconds(delay_ms as i64)
    }

    fn record_written(&self, context: &EventContext) {
        counter!(
            INGEST_EVENTS_SUCCEEDED_TOTAL,
            DESTINATION_ID_LABEL => context.destination_id.clone(),
            SOURCE_LABEL => context.source.clone()
        )
        .increment(1);
        self.stats.lock().succeeded += 1;
    }

    async fn schedule_retry(
        &self,
        context: &EventContext,
        event: &Event,
        error: &IngestError,
    ) -> IngestResult<()> {
        let retry_at = Utc::now() + self.retry_delay();

        match self.queue.enqueue_at(event.clone(), retry_at).await {
            Ok(()) => {
                warn!(
                    event_id = ?context.event_id,
                    %retry_at,
                    error = %error,
                    "destination unreachable, event scheduled for retry"
                );
                counter!(
                    INGEST_EVENTS_RETRIED_TOTAL,
                    DESTINATION_ID_LABEL => context.destination_id.clone(),
                    SOURCE_LABEL => context.source.clone()
                )
                .increment(1);
                self.stats.lock().retried += 1;

                Ok(())
            }
            Err(enqueue_error) => {
                error!(
                    event_id = ?context.event_id,
                    error = %enqueue_error,
                    "event could not be scheduled for retry"
                );
                let error = IngestError::from(vec![error.clone(), enqueue_error]);
                self.record_failure(context, event, &error).await
            }
        }
    }

    async fn record_failure(
        &self,
        context: &EventContext,
        event: &Event,
        error: &IngestError,
    ) -> IngestResult<()> {
        let error_text = error.to_compact_string();
        if let Some(solution) = build_error_handling_policy(error).solution() {
            warn!(
                event_id = ?context.event_id,
                error_kind = ?error.kind(),
                solution,
                "event failed permanently"
            );
        }

        counter!(
            INGEST_EVENTS_FAILED_TOTAL,
            DESTINATION_ID_LABEL => context.destination_id.clone(),
            SOURCE_LABEL => context.source.clone(),
            ERROR_KIND_LABEL => format!("{:?}", error.kind())
        )
        .increment(1);
        self.stats.lock().failed += 1;

        if let Some(events_cache) = &self.events_cache {
            events_cache.error(context, &error_text);
        }

        self.fallback
            .append(FallbackEntry::new(context, event, error_text))
            .await
    }
}

impl<Q, D, C, F> DestinationWorker for StreamingWorker<Q, D, C, F> {
    fn destination_id(&self) -> &str {
        &self.config.id
    }
}

impl<Q, D, C, F> Worker<StreamingWorkerHandle, StreamingWorkerStats>
    for StreamingWorker<Q, D, C, F>
where
    Q: EventQueue + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
    C: Coordinator + Clone + Send + Sync + 'static,
    F: FallbackLog + Clone + Send + Sync + 'static,
{
    type Error = IngestError;

    async fn start(self) -> Result<StreamingWorkerHandle, Self::Error> {
        let destination_id = self.config.id.clone();
        let stats = self.stats.clone();

        if self.config.staging {
            info!(%destination_id, "destination is staging only, streaming worker not started");
            return Ok(StreamingWorkerHandle {
                destination_id,
                stats,
                handle: None,
            });
        }

        let span = tracing::info_span!("streaming_worker", destination_id = %destination_id);
        let handle = tokio::spawn(self.run().instrument(span.or_current()));

        Ok(StreamingWorkerHandle {
            destination_id,
            stats,
            handle: Some(handle),
        })
    }
}
