//! Background worker loop that claims and runs queued geocoding jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::pipeline::PipelineOrchestrator;

use super::store::JobStore;
use super::types::Job;

pub(crate) struct QueueWorker {
    store: Arc<JobStore>,
    orchestrator: Arc<PipelineOrchestrator>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl QueueWorker {
    pub(crate) fn new(
        store: Arc<JobStore>,
        orchestrator: Arc<PipelineOrchestrator>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            orchestrator,
            poll_interval,
            cancel,
        }
    }

    /// Run the claim/process loop until the queue is shut down.
    pub(crate) async fn run(&self, worker_id: usize) {
        info!(worker_id, "queue worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let Some(job) = self.store.claim_next().await else {
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = sleep(self.poll_interval) => continue,
                }
            };

            self.process(worker_id, job).await;
        }

        info!(worker_id, "queue worker stopped");
    }

    async fn process(&self, worker_id: usize, job: Job) {
        info!(
            worker_id,
            job_id = %job.id,
            input = %job.input_path.display(),
            "processing geocoding job"
        );

        match self.orchestrator.run(&job, &self.cancel).await {
            Ok(_stats) => {
                self.store.mark_succeeded(job.id).await;
            }
            Err(job_error) => {
                error!(
                    worker_id,
                    job_id = %job.id,
                    error = %job_error,
                    "geocoding job failed"
                );
                self.store.mark_failed(job.id, &job_error.to_string()).await;
            }
        }
    }
}
