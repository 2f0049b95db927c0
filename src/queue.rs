//! Job queue and status store for background geocoding runs.
//!
//! Admission validates the input synchronously (user-input errors never
//! enqueue anything) and returns immediately; one or more worker loops
//! claim pending jobs and drive the pipeline. Clients poll by job id.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::JobError;
use crate::pipeline::PipelineOrchestrator;
use crate::table;

mod store;
mod types;
mod worker;

pub use store::JobStore;
pub use types::{Job, JobId, JobStatus, NewJob};
use worker::QueueWorker;

/// Queue settings, carved out of the application config so tests can
/// build a queue against temporary directories.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub address_column: String,
    pub poll_interval: Duration,
    /// Number of concurrent worker loops; jobs within one loop run
    /// strictly one at a time.
    pub job_concurrency: usize,
}

/// Facade owning the status store and the worker pool.
pub struct GeocodeJobQueue {
    store: Arc<JobStore>,
    settings: QueueSettings,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl GeocodeJobQueue {
    /// Create the queue and spawn its worker loops.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, settings: QueueSettings) -> Self {
        let store = Arc::new(JobStore::new());
        let cancel = CancellationToken::new();

        let mut workers = Vec::with_capacity(settings.job_concurrency);
        for worker_id in 0..settings.job_concurrency.max(1) {
            let worker = QueueWorker::new(
                Arc::clone(&store),
                Arc::clone(&orchestrator),
                settings.poll_interval,
                cancel.child_token(),
            );
            workers.push(tokio::spawn(async move { worker.run(worker_id).await }));
        }

        info!(
            job_concurrency = settings.job_concurrency.max(1),
            poll_interval_ms = settings.poll_interval.as_millis() as u64,
            "geocode job queue initialized"
        );

        Self {
            store,
            settings,
            cancel,
            workers: Mutex::new(workers),
        }
    }

    /// Admit one uploaded file as a job and return its id immediately.
    ///
    /// The source file is staged into the upload directory under a
    /// collision-free name embedding the job id; the output artifact
    /// name is derived from the same id so a status poll can point at
    /// it on success.
    ///
    /// # Errors
    /// Returns a user-input [`JobError`] when the file is unreadable or
    /// the required address column is absent; nothing is enqueued then.
    pub async fn submit(
        &self,
        source_path: &Path,
        original_filename: &str,
    ) -> Result<JobId, JobError> {
        let parsed = {
            let source = source_path.to_path_buf();
            tokio::task::spawn_blocking(move || table::read_table(&source))
                .await
                .map_err(|e| JobError::Fatal(anyhow::Error::new(e)))??
        };
        table::require_column(&parsed, &self.settings.address_column)?;

        // Only the final path component of the client-supplied name is
        // trusted; anything else could escape the artifact directories.
        let filename = Path::new(original_filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input.csv");

        let id = Uuid::new_v4();
        let input_path = self.settings.upload_dir.join(format!("{id}_{filename}"));
        let output_path = self
            .settings
            .processed_dir
            .join(format!("geocoded_{id}_{filename}"));

        tokio::fs::copy(source_path, &input_path).await.map_err(|e| {
            JobError::InvalidInput(format!("failed to stage {}: {e}", source_path.display()))
        })?;

        let job = self
            .store
            .enqueue(NewJob {
                id,
                input_path,
                output_path,
                original_filename: filename.to_string(),
            })
            .await;

        info!(
            job_id = %job.id,
            original_filename = filename,
            rows = parsed.row_count(),
            "job admitted"
        );
        Ok(job.id)
    }

    /// Point-in-time job snapshot; `None` means the id was never
    /// admitted, which is distinct from a pending job.
    pub async fn snapshot(&self, id: JobId) -> Option<Job> {
        self.store.snapshot(id).await
    }

    /// Request cooperative shutdown: running jobs stop at their next
    /// batch boundary, worker loops exit.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for all worker loops to exit after [`Self::shutdown`].
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker list lock");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for GeocodeJobQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
