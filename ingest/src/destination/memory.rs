use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, IngestResult};
use crate::types::{Record, Table, TableDiff};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Table>,
    rows: HashMap<String, Vec<Record>>,
    created_tables: Vec<String>,
    patches: Vec<TableDiff>,
}

/// In-memory destination for local runs and tests.
///
/// [`MemoryDestination`] keeps tables and rows in memory and records every DDL operation so tests
/// can assert how many migrations happened. Clones share the same state, which makes a single
/// instance usable as the shared database of several simulated server processes.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the live schema of every table.
    pub async fn tables(&self) -> HashMap<String, Table> {
        let inner = self.inner.lock().await;
        inner.tables.clone()
    }

    /// Returns a copy of the rows stored in a table.
    pub async fn rows(&self, table_name: &str) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner.rows.get(table_name).cloned().unwrap_or_default()
    }

    /// Returns the number of rows stored across all tables.
    pub async fn row_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.rows.values().map(Vec::len).sum()
    }

    /// Returns the names of the tables created so far, in creation order.
    pub async fn created_tables(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.created_tables.clone()
    }

    /// Returns every schema change applied so far, in order.
    pub async fn patches(&self) -> Vec<TableDiff> {
        let inner = self.inner.lock().await;
        inner.patches.clone()
    }

    /// Clears all tables, rows and recorded operations.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        *inner = Inner::default();
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn get_table_schema(&self, table_name: &str) -> IngestResult<Option<Table>> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.get(table_name).cloned())
    }

    async fn create_table(&self, table: &Table) -> IngestResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.tables.contains_key(&table.name) {
            debug!(table_name = %table.name, "table already exists, skipping creation");
            return Ok(());
        }

        info!(
            table_name = %table.name,
            columns = table.columns.len(),
            "creating table"
        );

        let mut created = table.clone();
        created.version = 0;
        created.delete_primary_key = false;
        inner.tables.insert(table.name.clone(), created);
        inner.created_tables.push(table.name.clone());

        Ok(())
    }

    async fn patch_table_schema(&self, diff: &TableDiff) -> IngestResult<()> {
        let mut inner = self.inner.lock().await;

        let Some(table) = inner.tables.get_mut(&diff.table_name) else {
            bail!(
                ErrorKind::DestinationTableMissing,
                "Table to patch does not exist",
                format!("table `{}`", diff.table_name)
            );
        };

        if let Some(existing) = diff
            .columns
            .keys()
            .find(|name| table.columns.contains_key(*name))
        {
            bail!(
                ErrorKind::DestinationSchemaError,
                "Column already exists",
                format!("column `{existing}` of table `{}`", diff.table_name)
            );
        }

        info!(
            table_name = %diff.table_name,
            added_columns = diff.columns.len(),
            primary_key_changed = diff.primary_key_fields.is_some() || diff.delete_primary_key,
            "patching table schema"
        );

        table.apply(diff);
        inner.patches.push(diff.clone());

        Ok(())
    }

    async fn insert(&self, table: &Table, record: &Record) -> IngestResult<()> {
        self.bulk_insert(table, std::slice::from_ref(record)).await
    }

    async fn bulk_insert(&self, table: &Table, records: &[Record]) -> IngestResult<()> {
        let mut inner = self.inner.lock().await;

        if !inner.tables.contains_key(&table.name) {
            bail!(
                ErrorKind::DestinationTableMissing,
                "Table to insert into does not exist",
                format!("table `{}`", table.name)
            );
        }

        debug!(table_name = %table.name, rows = records.len(), "inserting rows");

        inner
            .rows
            .entry(table.name.clone())
            .or_default()
            .extend_from_slice(records);

        Ok(())
    }
}
