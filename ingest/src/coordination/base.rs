use std::future::Future;

use crate::error::IngestResult;
use crate::types::TableKey;

/// Trait for services providing table locks and schema version counters.
///
/// Failures must be reported with [`crate::error::ErrorKind::CoordinationFailed`].
pub trait Coordinator {
    /// Acquires the lock of a table, waiting while another holder owns it.
    fn lock(&self, key: &TableKey) -> impl Future<Output = IngestResult<()>> + Send;

    /// Releases the lock of a table.
    fn unlock(&self, key: &TableKey) -> impl Future<Output = IngestResult<()>> + Send;

    /// Returns the schema version of a table, `0` for a table that was never migrated.
    fn get_version(&self, key: &TableKey) -> impl Future<Output = IngestResult<u64>> + Send;

    /// Increments the schema version of a table and returns the new version.
    fn increment_version(&self, key: &TableKey) -> impl Future<Output = IngestResult<u64>> + Send;
}
