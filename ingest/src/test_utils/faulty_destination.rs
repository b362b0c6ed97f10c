use crate::destination::Destination;
use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;
use crate::test_utils::fault::FaultPlan;
use crate::test_utils::notify::TimedNotify;
use crate::types::{Record, Table, TableDiff};

/// Operations of a [`Destination`] that can be faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationOperation {
    GetTableSchema,
    CreateTable,
    PatchTableSchema,
    Insert,
    BulkInsert,
}

/// Test wrapper for [`Destination`] implementations injecting failures and counting calls.
///
/// Failed calls never reach the wrapped destination. Clones share the wrapped destination and
/// the fault plan.
#[derive(Debug, Clone)]
pub struct FaultyDestination<D> {
    wrapped_destination: D,
    plan: FaultPlan<DestinationOperation>,
}

impl<D> FaultyDestination<D> {
    pub fn wrap(destination: D) -> Self {
        Self {
            wrapped_destination: destination,
            plan: FaultPlan::new(),
        }
    }

    pub fn wrapped(&self) -> &D {
        &self.wrapped_destination
    }

    /// Makes the next `times` calls of `operation` fail with `kind`, every call when `None`.
    pub fn fail(&self, operation: DestinationOperation, kind: ErrorKind, times: Option<u64>) {
        self.plan.inject(operation, kind, times);
    }

    /// Removes every injected failure.
    pub fn heal(&self) {
        self.plan.clear();
    }

    pub fn calls(&self, operation: DestinationOperation) -> u64 {
        self.plan.calls(operation)
    }

    pub fn notify_on_calls(&self, operation: DestinationOperation, count: u64) -> TimedNotify {
        self.plan.notify_on_calls(operation, count)
    }

    fn check(&self, operation: DestinationOperation) -> IngestResult<()> {
        match self.plan.record_call(operation) {
            Some(kind) => Err(ingest_error!(
                kind,
                "Injected destination failure",
                format!("{operation:?}")
            )),
            None => Ok(()),
        }
    }
}

impl<D> Destination for FaultyDestination<D>
where
    D: Destination + Send + Sync,
{
    fn name() -> &'static str {
        D::name()
    }

    async fn shutdown(&self) -> IngestResult<()> {
        self.wrapped_destination.shutdown().await
    }

    async fn get_table_schema(&self, table_name: &str) -> IngestResult<Option<Table>> {
        self.check(DestinationOperation::GetTableSchema)?;
        self.wrapped_destination.get_table_schema(table_name).await
    }

    async fn create_table(&self, table: &Table) -> IngestResult<()> {
        self.check(DestinationOperation::CreateTable)?;
        self.wrapped_destination.create_table(table).await
    }

    async fn patch_table_schema(&self, diff: &TableDiff) -> IngestResult<()> {
        self.check(DestinationOperation::PatchTableSchema)?;
        self.wrapped_destination.patch_table_schema(diff).await
    }

    async fn insert(&self, table: &Table, record: &Record) -> IngestResult<()> {
        self.check(DestinationOperation::Insert)?;
        self.wrapped_destination.insert(table, record).await
    }

    async fn bulk_insert(&self, table: &Table, records: &[Record]) -> IngestResult<()> {
        self.check(DestinationOperation::BulkInsert)?;
        self.wrapped_destination.bulk_insert(table, records).await
    }
}
