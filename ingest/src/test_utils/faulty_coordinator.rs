use crate::coordination::Coordinator;
use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;
use crate::test_utils::fault::FaultPlan;
use crate::types::TableKey;

/// Operations of a [`Coordinator`] that can be faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorOperation {
    Lock,
    Unlock,
    GetVersion,
    IncrementVersion,
}

/// Test wrapper for [`Coordinator`] implementations injecting failures and counting calls.
#[derive(Debug, Clone)]
pub struct FaultyCoordinator<C> {
    wrapped_coordinator: C,
    plan: FaultPlan<CoordinatorOperation>,
}

impl<C> FaultyCoordinator<C> {
    pub fn wrap(coordinator: C) -> Self {
        Self {
            wrapped_coordinator: coordinator,
            plan: FaultPlan::new(),
        }
    }

    pub fn wrapped(&self) -> &C {
        &self.wrapped_coordinator
    }

    /// Makes the next `times` calls of `operation` fail with `kind`, every call when `None`.
    pub fn fail(&self, operation: CoordinatorOperation, kind: ErrorKind, times: Option<u64>) {
        self.plan.inject(operation, kind, times);
    }

    pub fn calls(&self, operation: CoordinatorOperation) -> u64 {
        self.plan.calls(operation)
    }

    fn check(&self, operation: CoordinatorOperation) -> IngestResult<()> {
        match self.plan.record_call(operation) {
            Some(kind) => Err(ingest_error!(
                kind,
                "Injected coordinator failure",
                format!("{operation:?}")
            )),
            None => Ok(()),
        }
    }
}

impl<C> Coordinator for FaultyCoordinator<C>
where
    C: Coordinator + Send + Sync,
{
    async fn lock(&self, key: &TableKey) -> IngestResult<()> {
        self.check(CoordinatorOperation::Lock)?;
        self.wrapped_coordinator.lock(key).await
    }

    async fn unlock(&self, key: &TableKey) -> IngestResult<()> {
        self.check(CoordinatorOperation::Unlock)?;
        self.wrapped_coordinator.unlock(key).await
    }

    async fn get_version(&self, key: &TableKey) -> IngestResult<u64> {
        self.check(CoordinatorOperation::GetVersion)?;
        self.wrapped_coordinator.get_version(key).await
    }

    async fn increment_version(&self, key: &TableKey) -> IngestResult<u64> {
        self.check(CoordinatorOperation::IncrementVersion)?;
        self.wrapped_coordinator.increment_version(key).await
    }
}
