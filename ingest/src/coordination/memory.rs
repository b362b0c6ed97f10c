use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::bail;
use crate::coordination::Coordinator;
use crate::error::{ErrorKind, IngestResult};
use crate::types::TableKey;

/// Default time a caller waits for a table lock before giving up.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Inner {
    locks: Mutex<HashMap<TableKey, Arc<AsyncMutex<()>>>>,
    held: Mutex<HashMap<TableKey, OwnedMutexGuard<()>>>,
    versions: Mutex<HashMap<TableKey, u64>>,
}

/// In-process [`Coordinator`].
///
/// Clones share the same locks and versions, so one instance handed to several table helpers
/// behaves like a coordination service shared by several server processes.
#[derive(Debug, Clone)]
pub struct MemoryCoordinator {
    inner: Arc<Inner>,
    lock_timeout: Duration,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            lock_timeout,
        }
    }

    /// Returns `true` if the lock of `key` is currently held.
    pub fn is_locked(&self, key: &TableKey) -> bool {
        self.inner.held.lock().contains_key(key)
    }

    fn table_lock(&self, key: &TableKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.locks.lock();
        locks.entry(key.clone()).or_default().clone()
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator for MemoryCoordinator {
    async fn lock(&self, key: &TableKey) -> IngestResult<()> {
        let table_lock = self.table_lock(key);

        let Ok(guard) = tokio::time::timeout(self.lock_timeout, table_lock.lock_owned()).await
        else {
            bail!(
                ErrorKind::CoordinationFailed,
                "Timed out waiting for table lock",
                format!("lock `{key}` not acquired within {:?}", self.lock_timeout)
            );
        };

        debug!(%key, "table lock acquired");
        self.inner.held.lock().insert(key.clone(), guard);

        Ok(())
    }

    async fn unlock(&self, key: &TableKey) -> IngestResult<()> {
        let Some(guard) = self.inner.held.lock().remove(key) else {
            bail!(
                ErrorKind::CoordinationFailed,
                "Table lock is not held",
                format!("lock `{key}`")
            );
        };

        drop(guard);
        debug!(%key, "table lock released");

        Ok(())
    }

    async fn get_version(&self, key: &TableKey) -> IngestResult<u64> {
        Ok(self.inner.versions.lock().get(key).copied().unwrap_or(0))
    }

    async fn increment_version(&self, key: &TableKey) -> IngestResult<u64> {
        let mut versions = self.inner.versions.lock();
        let version = versions.entry(key.clone()).or_insert(0);
        *version += 1;

        Ok(*version)
    }
}
