use std::fmt;

use crate::error::IngestResult;
use crate::types::Record;

/// One record produced by a [`Transformer`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRecord {
    pub record: Record,
    /// Table the record is routed to instead of the one extracted from the raw record.
    pub table_name: Option<String>,
}

impl TransformedRecord {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            table_name: None,
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }
}

/// Result of transforming a mapped record.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Records(Vec<TransformedRecord>),
    /// The record must not be stored.
    Drop,
}

/// User supplied transformation of mapped records.
///
/// A transformer may split one record into several, reroute records to other tables or drop
/// them. Failures should be reported with [`crate::error::ErrorKind::TransformFailed`].
pub trait Transformer: fmt::Debug {
    fn transform(&self, record: Record) -> IngestResult<TransformOutcome>;
}
