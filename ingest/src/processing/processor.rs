use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use ingest_config::shared::DestinationConfig;
use tracing::debug;
use uuid::Uuid;

use crate::error::IngestResult;
use crate::processing::enrichment::{Enricher, NoopEnricher};
use crate::processing::processed::{
    FailedEvent, ProcessOutcome, ProcessedEvents, ProcessedFile, SkipReason, SkippedEvent,
};
use crate::processing::transform::{TransformOutcome, TransformedRecord, Transformer};
use crate::schema::column_name::{fold_column_name, normalize_name};
use crate::schema::flattener::Flattener;
use crate::schema::mapping::FieldMapper;
use crate::schema::table_name::{TableNameExtractor, TableNameOutcome};
use crate::schema::typing::TypeResolver;
use crate::types::{
    BatchHeader, DataType, Envelope, Event, Field, Record, Value, get_path, set_path, split_path,
};

/// Field stamped with the ingestion time on records sent to SQL destinations.
pub const TIMESTAMP_FIELD: &str = "_timestamp";

/// Converts raw events into [`Envelope`]s for one destination.
///
/// The steps applied to every record are: table name extraction, enrichment, field mapping,
/// transform, id and timestamp stamping (SQL destinations only), flattening, type resolution and
/// column name folding.
#[derive(Debug, Clone)]
pub struct Processor {
    destination_id: String,
    stamp_records: bool,
    break_on_error: bool,
    max_column_name_length: usize,
    unique_id_path: Vec<String>,
    unique_id_column: String,
    table_name_extractor: TableNameExtractor,
    field_mapper: FieldMapper,
    flattener: Flattener,
    type_resolver: TypeResolver,
    enricher: Arc<dyn Enricher + Send + Sync>,
    transformer: Option<Arc<dyn Transformer + Send + Sync>>,
}

impl Processor {
    pub fn new(config: &DestinationConfig) -> IngestResult<Self> {
        let unique_id_path = split_path(&config.unique_id_field);
        let max_column_name_length = config.max_column_name_length();
        let unique_id_column =
            fold_column_name(&normalize_name(&unique_id_path.join("_")), max_column_name_length);

        let default_types = config
            .default_types
            .iter()
            .map(|(name, field_type)| (name.clone(), DataType::from(*field_type)))
            .collect();

        Ok(Self {
            destination_id: config.id.clone(),
            stamp_records: config.kind.is_sql(),
            break_on_error: config.break_on_error,
            max_column_name_length,
            unique_id_path,
            unique_id_column,
            table_name_extractor: TableNameExtractor::new(&config.table_name_template)?,
            field_mapper: FieldMapper::new(&config.mapping)?,
            flattener: Flattener::new(config.store_nulls),
            type_resolver: TypeResolver::new(default_types),
            enricher: Arc::new(NoopEnricher),
            transformer: None,
        })
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher + Send + Sync>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer + Send + Sync>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Name of the flat column holding the unique event id.
    pub fn unique_id_column(&self) -> &str {
        &self.unique_id_column
    }

    /// Returns the unique id of a raw record, if it carries one.
    pub fn extract_event_id(&self, record: &Record) -> Option<String> {
        get_path(record, &self.unique_id_path)
            .filter(|value| !value.is_null())
            .map(Value::to_string)
    }

    /// Gives a raw event a unique id when this destination stamps records and the event has
    /// none.
    ///
    /// Callers stamp an event once before its first attempt, so retries and fallback replays of
    /// the event keep writing the same id.
    pub fn stamp_event_id(&self, event: &mut Event) -> IngestResult<()> {
        if self.stamp_records
            && get_path(&event.record, &self.unique_id_path).is_none_or(Value::is_null)
        {
            set_path(
                &mut event.record,
                &self.unique_id_path,
                Value::String(Uuid::new_v4().to_string()),
            )?;
        }

        Ok(())
    }

    /// Processes a single event.
    pub fn process_event(&self, event: &Event) -> IngestResult<ProcessOutcome> {
        let table_name = match self.table_name_extractor.extract(&event.record) {
            TableNameOutcome::Name(name) => name,
            TableNameOutcome::Skip => {
                return Ok(ProcessOutcome::Skipped(SkipReason::EmptyTableName));
            }
        };

        let mut record = event.record.clone();
        self.enricher.enrich(&mut record)?;
        let mapped = self.field_mapper.map(&record)?;

        let transformed = match &self.transformer {
            None => vec![TransformedRecord::new(mapped)],
            Some(transformer) => match transformer.transform(mapped)? {
                TransformOutcome::Records(records) if !records.is_empty() => records,
                TransformOutcome::Records(_) | TransformOutcome::Drop => {
                    return Ok(ProcessOutcome::Skipped(SkipReason::DroppedByTransform));
                }
            },
        };

        let envelopes = transformed
            .into_iter()
            .map(|transformed| {
                let table_name = transformed
                    .table_name
                    .map(|name| normalize_name(name.trim()))
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| table_name.clone());

                self.build_envelope(table_name, transformed.record)
            })
            .collect::<IngestResult<Vec<_>>>()?;

        Ok(ProcessOutcome::Envelopes(envelopes))
    }

    /// Processes a batch of events, grouping the produced rows per table.
    ///
    /// Events are stamped with [`Processor::stamp_event_id`] first and the stamped events are the
    /// ones kept in the result.
    ///
    /// A failing event is collected in [`ProcessedEvents::failed`] unless the destination is
    /// configured to break on errors, in which case the whole batch fails.
    pub fn process_events(&self, events: &[Event]) -> IngestResult<ProcessedEvents> {
        let mut processed = ProcessedEvents::default();

        for (event_index, event) in events.iter().enumerate() {
            let mut event = event.clone();
            let outcome = self
                .stamp_event_id(&mut event)
                .and_then(|()| self.process_event(&event));
            let event_id = self.extract_event_id(&event.record);

            match outcome {
                Ok(ProcessOutcome::Envelopes(envelopes)) => {
                    for envelope in envelopes {
                        let row_event_id = event_id.clone().or_else(|| {
                            envelope
                                .record
                                .get(&self.unique_id_column)
                                .map(Value::to_string)
                        });

                        processed
                            .tables
                            .entry(envelope.header.table_name.clone())
                            .or_insert_with(|| {
                                ProcessedFile::new(envelope.header.table_name.clone())
                            })
                            .push(envelope, &event, event_index, row_event_id);
                    }
                }
                Ok(ProcessOutcome::Skipped(reason)) => {
                    debug!(
                        destination_id = %self.destination_id,
                        event_id = ?event_id,
                        %reason,
                        "event skipped"
                    );
                    processed.skipped.push(SkippedEvent {
                        event,
                        event_id,
                        reason,
                    });
                }
                Err(err) if self.break_on_error => return Err(err),
                Err(error) => {
                    debug!(
                        destination_id = %self.destination_id,
                        event_id = ?event_id,
                        error = %error,
                        "event failed processing"
                    );
                    processed.failed.push(FailedEvent {
                        event,
                        event_id,
                        error,
                    });
                }
            }
        }

        Ok(processed)
    }

    fn build_envelope(&self, table_name: String, mut record: Record) -> IngestResult<Envelope> {
        if self.stamp_records {
            self.stamp(&mut record)?;
        }

        let mut flat = self.flattener.flatten_object(&record);
        let fields = self.type_resolver.resolve(&mut flat)?;

        let (fields, flat) = self.fold_names(fields, flat);

        Ok(Envelope {
            header: BatchHeader::new(table_name, fields),
            record: flat,
        })
    }

    fn stamp(&self, record: &mut Record) -> IngestResult<()> {
        if get_path(record, &self.unique_id_path).is_none_or(Value::is_null) {
            set_path(
                record,
                &self.unique_id_path,
                Value::String(Uuid::new_v4().to_string()),
            )?;
        }

        if record.get(TIMESTAMP_FIELD).is_none_or(Value::is_null) {
            record.insert(TIMESTAMP_FIELD.to_string(), Value::Timestamp(Utc::now()));
        }

        Ok(())
    }

    fn fold_names(
        &self,
        fields: BTreeMap<String, Field>,
        flat: Record,
    ) -> (BTreeMap<String, Field>, Record) {
        if self.max_column_name_length == 0 {
            return (fields, flat);
        }

        let max = self.max_column_name_length;
        let mut folded_fields: BTreeMap<String, Field> = BTreeMap::new();
        for (name, field) in fields {
            folded_fields
                .entry(fold_column_name(&name, max))
                .and_modify(|existing| existing.merge(&field))
                .or_insert(field);
        }

        let folded_record = flat
            .into_iter()
            .map(|(name, value)| (fold_column_name(&name, max), value))
            .collect();

        (folded_fields, folded_record)
    }
}
