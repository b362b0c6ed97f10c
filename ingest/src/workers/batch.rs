use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use ingest_config::shared::DestinationConfig;
use metrics::counter;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::coordination::Coordinator;
use crate::destination::Destination;
use crate::error::{IngestError, IngestResult};
use crate::events::EventsCache;
use crate::fallback::{FallbackEntry, FallbackLog};
use crate::metrics::{
    DESTINATION_ID_LABEL, ERROR_KIND_LABEL, INGEST_EVENTS_FAILED_TOTAL,
    INGEST_EVENTS_SKIPPED_TOTAL, INGEST_EVENTS_SUCCEEDED_TOTAL, SOURCE_LABEL, TABLE_NAME_LABEL,
};
use crate::processing::processed::{ProcessedFile, ProcessedRow};
use crate::processing::processor::Processor;
use crate::schema::table_helper::TableHelper;
use crate::types::{Event, EventContext};
use crate::workers::policy::build_error_handling_policy;

/// Outcome counts of a [`BatchUploader::upload`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Rows written to the destination.
    pub succeeded: u64,
    /// Events written to the fallback log.
    pub failed: u64,
    /// Events that produced no rows.
    pub skipped: u64,
    /// Tables that received a bulk insert attempt.
    pub tables: u64,
}

/// Rows an event produced in a batch and how their tables fared.
struct EventRows<'a> {
    first: &'a ProcessedRow,
    written: Vec<&'a ProcessedRow>,
    errors: Vec<IngestError>,
    failed_table: Option<&'a str>,
}

impl<'a> EventRows<'a> {
    fn new(first: &'a ProcessedRow) -> Self {
        Self {
            first,
            written: Vec::new(),
            errors: Vec::new(),
            failed_table: None,
        }
    }
}

/// Uploads a batch of events to one destination with a bulk insert per table.
#[derive(Debug, Clone)]
pub struct BatchUploader<D, C, F> {
    config: Arc<DestinationConfig>,
    processor: Processor,
    table_helper: TableHelper<D, C>,
    fallback: F,
    events_cache: Option<Arc<dyn EventsCache + Send + Sync>>,
}

impl<D, C, F> BatchUploader<D, C, F>
where
    D: Destination + Clone + Send + Sync + 'static,
    C: Coordinator + Clone + Send + Sync + 'static,
    F: FallbackLog + Clone + Send + Sync + 'static,
{
    pub fn new(
        config: Arc<DestinationConfig>,
        processor: Processor,
        table_helper: TableHelper<D, C>,
        fallback: F,
    ) -> Self {
        Self {
            config,
            processor,
            table_helper,
            fallback,
            events_cache: None,
        }
    }

    /// Sets the events cache. It is only used when enabled in the destination configuration.
    pub fn with_events_cache(mut self, events_cache: Arc<dyn EventsCache + Send + Sync>) -> Self {
        self.events_cache = self.config.events_cache.enabled.then_some(events_cache);
        self
    }

    /// Processes `events` and writes the resulting rows, one bulk insert per table.
    ///
    /// Tables are written concurrently. An event with a row in a failed table is written to the
    /// fallback log once, with the errors of all its failed tables. Processing errors abort the
    /// upload only when the destination breaks on errors.
    pub async fn upload(&self, events: &[Event]) -> IngestResult<UploadSummary> {
        let span = info_span!(
            "batch_upload",
            destination_id = %self.config.id,
            events = events.len()
        );

        self.upload_inner(events).instrument(span).await
    }

    async fn upload_inner(&self, events: &[Event]) -> IngestResult<UploadSummary> {
        let processed = self.processor.process_events(events)?;
        let mut summary = UploadSummary::default();

        for skipped in &processed.skipped {
            let context = self.context(&skipped.event, skipped.event_id.clone());
            counter!(
                INGEST_EVENTS_SKIPPED_TOTAL,
                DESTINATION_ID_LABEL => context.destination_id.clone(),
                SOURCE_LABEL => context.source.clone()
            )
            .increment(1);
            if let Some(events_cache) = &self.events_cache {
                events_cache.skip(&context, &skipped.reason.to_string());
            }
            summary.skipped += 1;
        }

        for failed in &processed.failed {
            let context = self.context(&failed.event, failed.event_id.clone());
            self.record_failure(&context, &failed.event, &failed.error, None)
                .await?;
            summary.failed += 1;
        }

        let files: Vec<&ProcessedFile> = processed
            .tables
            .values()
            .filter(|file| file.header.exists())
            .collect();
        summary.tables = files.len() as u64;

        let results = join_all(files.iter().map(|file| self.write_file(file))).await;

        // Rows of one event can land in several tables, outcomes are settled per event.
        let mut outcomes: BTreeMap<usize, EventRows<'_>> = BTreeMap::new();
        for (file, result) in files.into_iter().zip(results) {
            let table_name = file.header.table_name.as_str();
            match &result {
                Ok(()) => debug!(%table_name, rows = file.rows.len(), "table uploaded"),
                Err(err) => {
                    warn!(%table_name, rows = file.rows.len(), error = %err, "table upload failed")
                }
            }

            for row in &file.rows {
                let outcome = outcomes
                    .entry(row.event_index)
                    .or_insert_with(|| EventRows::new(row));

                match &result {
                    Ok(()) => {
                        counter!(
                            INGEST_EVENTS_SUCCEEDED_TOTAL,
                            DESTINATION_ID_LABEL => self.config.id.clone(),
                            SOURCE_LABEL => row.event.source.clone()
                        )
                        .increment(1);
                        outcome.written.push(row);
                        summary.succeeded += 1;
                    }
                    Err(err) => {
                        outcome.errors.push(err.clone());
                        outcome.failed_table.get_or_insert(table_name);
                    }
                }
            }
        }

        for outcome in outcomes.into_values() {
            let context = self.context(&outcome.first.event, outcome.first.event_id.clone());

            if !outcome.errors.is_empty() {
                let error = IngestError::from(outcome.errors);
                self.record_failure(&context, &outcome.first.event, &error, outcome.failed_table)
                    .await?;
                summary.failed += 1;
                continue;
            }

            if let Some(events_cache) = &self.events_cache {
                for row in outcome.written {
                    events_cache.succeed(&context, &row.record);
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "batch upload finished"
        );

        Ok(summary)
    }

    async fn write_file(&self, file: &ProcessedFile) -> IngestResult<()> {
        let desired = self.table_helper.map_table_schema(&file.header);
        let table = self.table_helper.ensure_table(&desired).await?;

        self.table_helper
            .destination()
            .bulk_insert(&table, &file.records())
            .await
    }

    fn context(&self, event: &Event, event_id: Option<String>) -> EventContext {
        EventContext {
            destination_id: self.config.id.clone(),
            event_id,
            source: event.source.clone(),
        }
    }

    async fn record_failure(
        &self,
        context: &EventContext,
        event: &Event,
        error: &IngestError,
        table_name: Option<&str>,
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
            TABLE_NAME_LABEL => table_name.unwrap_or_default().to_string(),
            ERROR_KIND_LABEL => format!("{:?}", error.kind())
        )
        .increment(1);

        if let Some(events_cache) = &self.events_cache {
            events_cache.error(context, &error_text);
        }

        self.fallback
            .append(FallbackEntry::new(context, event, error_text))
            .await
    }
}
