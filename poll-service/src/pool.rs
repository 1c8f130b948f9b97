//! Fixed-size pool of connection workers.
//!
//! Each submitted job holds one semaphore permit for as long as it runs, so at
//! most `size` jobs are ever in flight. `submit` waits for a free permit, which
//! pushes backpressure onto the accept loop instead of queueing without bound.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Result, ensure};
use thiserror::Error;
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
    time::timeout,
};
use tracing::{debug, warn};

#[derive(Debug, Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        ensure!(size > 0, "worker pool needs at least one worker");
        Ok(Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            tasks: JoinSet::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs currently holding a worker slot.
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Runs `job` on the pool, waiting while every worker is busy.
    ///
    /// Cancel-safe: dropping the returned future before it completes leaves
    /// the pool unchanged and `job` is never started.
    pub async fn submit<F>(&mut self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;

        self.reap_finished();
        self.tasks.spawn(async move {
            job.await;
            drop(permit);
        });
        Ok(())
    }

    /// Stops admitting jobs and waits up to `grace` for in-flight ones.
    ///
    /// Jobs still running after `grace` are aborted.
    pub async fn shutdown(mut self, grace: Duration) {
        self.permits.close();

        let drained = timeout(grace, async {
            while let Some(result) = self.tasks.join_next().await {
                report_join_result(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "workers did not finish in time; aborting"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
        debug!("worker pool stopped");
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            report_join_result(result);
        }
    }
}

fn report_join_result(result: Result<(), JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            warn!(error = ?err, "connection worker panicked");
        }
    }
}
