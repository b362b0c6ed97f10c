use std::collections::BTreeMap;
use std::fmt;

use crate::error::IngestError;
use crate::types::{BatchHeader, Envelope, Event, Record};

/// Why an event produced no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The table name template rendered to an empty, `null` or `false` name.
    EmptyTableName,
    /// The transformer dropped the record or returned no records.
    DroppedByTransform,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyTableName => f.write_str("table name is empty"),
            SkipReason::DroppedByTransform => f.write_str("dropped by transform"),
        }
    }
}

/// Result of processing a single event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Envelopes(Vec<Envelope>),
    Skipped(SkipReason),
}

/// One flat row of a [`ProcessedFile`] together with the event it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRow {
    pub record: Record,
    pub event_id: Option<String>,
    pub event: Event,
    /// Position of the event in the processed batch.
    pub event_index: usize,
}

/// Rows of a processing run addressed to the same table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessedFile {
    /// Union of the headers of every row.
    pub header: BatchHeader,
    pub rows: Vec<ProcessedRow>,
    /// Number of rows per source tag.
    pub source_counts: BTreeMap<String, u64>,
}

impl ProcessedFile {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            header: BatchHeader::new(table_name, BTreeMap::new()),
            ..Default::default()
        }
    }

    /// Adds an envelope produced from `event`.
    pub fn push(
        &mut self,
        envelope: Envelope,
        event: &Event,
        event_index: usize,
        event_id: Option<String>,
    ) {
        self.header.merge(&envelope.header);
        *self.source_counts.entry(event.source.clone()).or_default() += 1;
        self.rows.push(ProcessedRow {
            record: envelope.record,
            event_id,
            event: event.clone(),
            event_index,
        });
    }

    pub fn records(&self) -> Vec<Record> {
        self.rows.iter().map(|row| row.record.clone()).collect()
    }
}

/// Event that failed processing.
#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub event: Event,
    pub event_id: Option<String>,
    pub error: IngestError,
}

/// Event that produced no rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEvent {
    pub event: Event,
    pub event_id: Option<String>,
    pub reason: SkipReason,
}

/// Result of processing a batch of events.
#[derive(Debug, Clone, Default)]
pub struct ProcessedEvents {
    pub tables: BTreeMap<String, ProcessedFile>,
    pub failed: Vec<FailedEvent>,
    pub skipped: Vec<SkippedEvent>,
}

impl ProcessedEvents {
    /// Returns the number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.values().map(|file| file.rows.len()).sum()
    }
}
