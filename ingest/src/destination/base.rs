use std::future::Future;

use crate::error::IngestResult;
use crate::types::{Record, Table, TableDiff};

/// Trait for systems that store ingested rows in tables.
///
/// Implementations must report connectivity problems with
/// [`crate::error::ErrorKind::DestinationConnectionFailed`]: records failing with that kind are
/// retried later instead of being written to the fallback log.
///
/// The trait also provides an optional [`Destination::shutdown`] method with a default no-op
/// implementation. Override this method if your destination requires cleanup when the server
/// shuts down.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Propagates the shutdown signal to the destination.
    fn shutdown(&self) -> impl Future<Output = IngestResult<()>> + Send {
        async { Ok(()) }
    }

    /// Returns the live schema of a table, `None` if the table does not exist.
    fn get_table_schema(
        &self,
        table_name: &str,
    ) -> impl Future<Output = IngestResult<Option<Table>>> + Send;

    /// Creates a table with the given columns and primary key.
    ///
    /// Creating a table that already exists must not fail.
    fn create_table(&self, table: &Table) -> impl Future<Output = IngestResult<()>> + Send;

    /// Applies an additive schema change to an existing table.
    fn patch_table_schema(&self, diff: &TableDiff)
    -> impl Future<Output = IngestResult<()>> + Send;

    /// Inserts a single flat record.
    fn insert(&self, table: &Table, record: &Record)
    -> impl Future<Output = IngestResult<()>> + Send;

    /// Inserts a batch of flat records into the same table.
    fn bulk_insert(
        &self,
        table: &Table,
        records: &[Record],
    ) -> impl Future<Output = IngestResult<()>> + Send;
}
