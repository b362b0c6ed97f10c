use std::collections::BTreeMap;

use crate::types::{Field, Record};

/// Inferred logical schema of a table for one or more records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchHeader {
    pub table_name: String,
    pub fields: BTreeMap<String, Field>,
}

impl BatchHeader {
    pub fn new(table_name: impl Into<String>, fields: BTreeMap<String, Field>) -> Self {
        Self {
            table_name: table_name.into(),
            fields,
        }
    }

    /// Returns `false` for headers without a table name or without fields.
    ///
    /// Such headers mark records that produce nothing to write.
    pub fn exists(&self) -> bool {
        !self.table_name.is_empty() && !self.fields.is_empty()
    }

    /// Merges the fields of `other` into this header, widening types where they differ.
    pub fn merge(&mut self, other: &BatchHeader) {
        for (name, field) in &other.fields {
            self.fields
                .entry(name.clone())
                .and_modify(|existing| existing.merge(field))
                .or_insert_with(|| field.clone());
        }
    }
}

/// One logical output row: the schema fragment and the flat record it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub header: BatchHeader,
    pub record: Record,
}
