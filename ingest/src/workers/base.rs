use std::future::Future;

use crate::error::IngestResult;

/// Trait for background workers.
///
/// The generic parameter `H` is the handle returned when the worker starts and `S` the state
/// readable through that handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type returned when worker startup fails.
    type Error;

    /// Starts the worker and returns a handle to observe and await it.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// Handle of a running worker.
pub trait WorkerHandle<S> {
    /// Returns a snapshot of the worker's state.
    fn state(&self) -> S;

    /// Waits for the worker to complete.
    fn wait(self) -> impl Future<Output = IngestResult<()>> + Send;
}

/// Worker consuming the events of a single destination.
pub trait DestinationWorker {
    fn destination_id(&self) -> &str;
}
