use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Physical column of a destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlColumn {
    pub sql_type: String,
    /// Full column definition used in DDL when present.
    pub column_type: Option<String>,
}

impl SqlColumn {
    pub fn new(sql_type: impl Into<String>) -> Self {
        Self {
            sql_type: sql_type.into(),
            column_type: None,
        }
    }

    /// Returns the definition to use when creating the column.
    pub fn ddl_type(&self) -> &str {
        self.column_type.as_deref().unwrap_or(&self.sql_type)
    }
}

/// Physical schema of a destination table.
///
/// `version` is the cross-process concurrency token of the table. It is assigned by the
/// coordinator and only advances after a schema change was applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub name: String,
    pub columns: BTreeMap<String, SqlColumn>,
    pub primary_key_fields: BTreeSet<String>,
    /// Requests removal of the primary key.
    pub delete_primary_key: bool,
    pub version: u64,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, column: SqlColumn) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    pub fn with_primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Computes what must be applied to this table so that it satisfies `desired`.
    ///
    /// Only additions are reported: columns of this table missing from `desired` and columns
    /// whose type differs are left alone. The primary key is replaced only when `desired` names
    /// a key field this table's key lacks, and removed only on an explicit deletion request.
    pub fn diff(&self, desired: &Table) -> TableDiff {
        let columns = desired
            .columns
            .iter()
            .filter(|(name, _)| !self.columns.contains_key(*name))
            .map(|(name, column)| (name.clone(), column.clone()))
            .collect();

        let primary_key_fields = (!desired.primary_key_fields.is_empty()
            && !desired
                .primary_key_fields
                .is_subset(&self.primary_key_fields))
        .then(|| desired.primary_key_fields.clone());

        let delete_primary_key = primary_key_fields.is_none()
            && desired.delete_primary_key
            && !self.primary_key_fields.is_empty();

        TableDiff {
            table_name: self.name.clone(),
            columns,
            primary_key_fields,
            delete_primary_key,
        }
    }

    /// Applies a diff to this table.
    pub fn apply(&mut self, diff: &TableDiff) {
        for (name, column) in &diff.columns {
            self.columns
                .entry(name.clone())
                .or_insert_with(|| column.clone());
        }

        if let Some(primary_key_fields) = &diff.primary_key_fields {
            self.primary_key_fields = primary_key_fields.clone();
        } else if diff.delete_primary_key {
            self.primary_key_fields.clear();
        }
    }
}

/// Additive change between a cached and a desired table schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDiff {
    pub table_name: String,
    /// Columns to add.
    pub columns: BTreeMap<String, SqlColumn>,
    /// New primary key, replacing the current one.
    pub primary_key_fields: Option<BTreeSet<String>>,
    pub delete_primary_key: bool,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.primary_key_fields.is_none() && !self.delete_primary_key
    }
}

/// Key of the distributed lock and version counter of a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub destination_id: String,
    pub table_name: String,
}

impl TableKey {
    pub fn new(destination_id: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            destination_id: destination_id.into(),
            table_name: table_name.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.destination_id, self.table_name)
    }
}
