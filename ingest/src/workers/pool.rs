use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::ingest_error;
use crate::workers::base::{DestinationWorker, Worker, WorkerHandle};
use crate::workers::streaming::{StreamingWorkerHandle, StreamingWorkerStats};

type SharedStats = Arc<parking_lot::Mutex<StreamingWorkerStats>>;

/// Pool running one streaming worker per destination.
///
/// Workers consume their queues independently. [`StreamingWorkerPool::wait_all`] waits until
/// every worker has stopped and aggregates the errors they returned.
#[derive(Debug, Clone, Default)]
pub struct StreamingWorkerPool {
    stats: Arc<parking_lot::Mutex<BTreeMap<String, SharedStats>>>,
    join_set: Arc<Mutex<JoinSet<(String, IngestResult<()>)>>>,
}

impl StreamingWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `worker` and adds it to the pool.
    ///
    /// Fails without starting the worker when a worker for the same destination is already part
    /// of the pool.
    pub async fn start<W>(&self, worker: W) -> IngestResult<()>
    where
        W: Worker<StreamingWorkerHandle, StreamingWorkerStats, Error = IngestError>
            + DestinationWorker
            + Send,
    {
        let destination_id = worker.destination_id().to_string();

        {
            let mut stats = self.stats.lock();
            if stats.contains_key(&destination_id) {
                return Err(ingest_error!(
                    ErrorKind::InvalidState,
                    "A streaming worker for this destination is already running",
                    detail = destination_id
                ));
            }
            // Reserved until the worker is started.
            stats.insert(destination_id.clone(), SharedStats::default());
        }

        let handle = match worker.start().await {
            Ok(handle) => handle,
            Err(err) => {
                self.stats.lock().remove(&destination_id);
                return Err(err);
            }
        };
        self.stats
            .lock()
            .insert(destination_id.clone(), handle.shared_stats());

        let mut join_set = self.join_set.lock().await;
        let id = destination_id.clone();
        join_set.spawn(async move { (id, handle.wait().await) });

        debug!(%destination_id, "added streaming worker to pool");

        Ok(())
    }

    /// Returns the counters of every worker in the pool, by destination id.
    pub fn states(&self) -> BTreeMap<String, StreamingWorkerStats> {
        self.stats
            .lock()
            .iter()
            .map(|(destination_id, stats)| (destination_id.clone(), *stats.lock()))
            .collect()
    }

    /// Waits for every worker of the pool to stop.
    ///
    /// Errors returned by workers are collected and returned together once all of them stopped.
    pub async fn wait_all(&self) -> IngestResult<()> {
        let mut errors = Vec::new();

        loop {
            let result = {
                let mut join_set = self.join_set.lock().await;
                join_set.join_next().await
            };

            let Some(result) = result else {
                break;
            };

            match result {
                Ok((destination_id, Ok(()))) => {
                    debug!(%destination_id, "streaming worker stopped");
                }
                Ok((destination_id, Err(err))) => {
                    error!(%destination_id, error = %err, "streaming worker completed with error");
                    errors.push(err);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        warn!("streaming worker wait task was cancelled");
                    } else {
                        errors.push(ingest_error!(
                            ErrorKind::WorkerPanic,
                            "Streaming worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}
