use std::collections::BTreeSet;
use std::fmt;

use ingest_config::shared::FieldType;

/// Logical type of a field.
///
/// Types form a join semilattice used when several records disagree on the type of a field:
/// [`DataType::Unknown`] is the identity, `INT64 ⊔ FLOAT64 = FLOAT64`, and any other pair of
/// distinct types joins to [`DataType::String`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    Unknown,
    Bool,
    Int64,
    Float64,
    String,
    Timestamp,
}

impl DataType {
    /// Returns the least type both `self` and `other` widen to.
    pub fn join(self, other: DataType) -> DataType {
        match (self, other) {
            (a, b) if a == b => a,
            (DataType::Unknown, other) | (other, DataType::Unknown) => other,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            _ => DataType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Unknown => "UNKNOWN",
            DataType::Bool => "BOOL",
            DataType::Int64 => "INT64",
            DataType::Float64 => "FLOAT64",
            DataType::String => "STRING",
            DataType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FieldType> for DataType {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Unknown => DataType::Unknown,
            FieldType::Bool => DataType::Bool,
            FieldType::Int64 => DataType::Int64,
            FieldType::Float64 => DataType::Float64,
            FieldType::String => DataType::String,
            FieldType::Timestamp => DataType::Timestamp,
        }
    }
}

/// SQL type requested for a field through the override marker or a mapping rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTypeSuggestion {
    pub sql_type: String,
    /// Column definition used in DDL instead of `sql_type`, e.g. `varchar(64) not null`.
    pub column_type: Option<String>,
}

/// Inferred schema of one field across one or more records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    occurrences: BTreeSet<DataType>,
    suggestion: Option<SqlTypeSuggestion>,
}

impl Field {
    pub fn new(data_type: DataType) -> Self {
        Self {
            occurrences: BTreeSet::from([data_type]),
            suggestion: None,
        }
    }

    /// Creates a field carrying only a SQL type suggestion.
    pub fn suggested(suggestion: SqlTypeSuggestion) -> Self {
        Self {
            occurrences: BTreeSet::new(),
            suggestion: Some(suggestion),
        }
    }

    pub fn with_suggestion(mut self, suggestion: Option<SqlTypeSuggestion>) -> Self {
        self.suggestion = suggestion;
        self
    }

    pub fn occurrences(&self) -> &BTreeSet<DataType> {
        &self.occurrences
    }

    pub fn suggestion(&self) -> Option<&SqlTypeSuggestion> {
        self.suggestion.as_ref()
    }

    /// Returns the join of every type seen, [`DataType::Unknown`] when none was.
    pub fn resolved_type(&self) -> DataType {
        self.occurrences
            .iter()
            .fold(DataType::Unknown, |acc, data_type| acc.join(*data_type))
    }

    /// Merges the occurrences of `other` into this field.
    ///
    /// The first suggestion seen for a field is kept.
    pub fn merge(&mut self, other: &Field) {
        self.occurrences.extend(other.occurrences.iter().copied());
        if self.suggestion.is_none() {
            self.suggestion = other.suggestion.clone();
        }
    }
}
