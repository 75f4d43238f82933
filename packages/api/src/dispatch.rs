//! In-process firing for the local scheduler.
//!
//! Development deployments have no managed scheduler or Lambda; due drop
//! events run the worker pipeline on the server's own runtime and report
//! back over HTTP exactly like a remote worker would.

use cierge_scheduler::FireHandler;
use cierge_types::DropEvent;
use cierge_worker::Worker;
use tokio_util::sync::CancellationToken;

use crate::services::JobService;

pub struct LocalWorkerHandler {
    worker: Worker,
    jobs: JobService,
    shutdown: CancellationToken,
}

impl LocalWorkerHandler {
    pub fn new(worker: Worker, jobs: JobService, shutdown: CancellationToken) -> Self {
        Self {
            worker,
            jobs,
            shutdown,
        }
    }
}

#[async_trait::async_trait]
impl FireHandler for LocalWorkerHandler {
    async fn fire(&self, event: DropEvent) {
        match self.jobs.claim_fired(event.job_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %event.job_id, "Fired job is no longer scheduled, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %event.job_id, error = %e, "Could not mark job running");
            }
        }
        self.worker.run(event, &self.shutdown).await;
    }
}
