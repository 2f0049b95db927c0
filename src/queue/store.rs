//! In-memory job queue and status store.
//!
//! Every transition happens under one write lock, so a concurrent
//! status reader always observes a whole record. Transitions are
//! monotonic (pending -> running -> terminal) and only the queue worker
//! drives them; a late transition attempt against a terminal job is
//! logged and ignored rather than reverting state.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;

use super::types::{Job, JobId, JobStatus, NewJob};

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a job in `Pending` state. Non-blocking beyond the lock.
    pub async fn enqueue(&self, new: NewJob) -> Job {
        let job = Job {
            id: new.id,
            status: JobStatus::Pending,
            input_path: new.input_path,
            output_path: new.output_path,
            original_filename: new.original_filename,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        job
    }

    /// Claim the oldest pending job, atomically marking it running.
    /// Returns `None` when nothing is pending.
    pub async fn claim_next(&self) -> Option<Job> {
        let mut jobs = self.jobs.write().await;
        let id = jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .min_by_key(|job| job.created_at)
            .map(|job| job.id)?;

        let job = jobs.get_mut(&id)?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        Some(job.clone())
    }

    /// Record the success terminal state exactly once.
    pub async fn mark_succeeded(&self, id: JobId) {
        self.complete(id, JobStatus::Succeeded, None).await;
    }

    /// Record the failure terminal state exactly once.
    pub async fn mark_failed(&self, id: JobId, error: &str) {
        self.complete(id, JobStatus::Failed, Some(error.to_string()))
            .await;
    }

    async fn complete(&self, id: JobId, status: JobStatus, error: Option<String>) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            warn!(job_id = %id, "attempted to complete unknown job");
            return;
        };
        if job.status.is_terminal() {
            warn!(
                job_id = %id,
                current = job.status.as_str(),
                attempted = status.as_str(),
                "ignoring transition on terminal job"
            );
            return;
        }
        job.status = status;
        job.error = error;
        job.completed_at = Some(Utc::now());
    }

    /// Point-in-time copy of a job; `None` for unknown ids, which is
    /// observably distinct from a known pending job.
    pub async fn snapshot(&self, id: JobId) -> Option<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::*;

    fn new_job() -> NewJob {
        let id = Uuid::new_v4();
        NewJob {
            id,
            input_path: PathBuf::from(format!("uploads/{id}_input.csv")),
            output_path: PathBuf::from(format!("processed/geocoded_{id}_input.csv")),
            original_filename: "input.csv".to_string(),
        }
    }

    #[tokio::test]
    async fn enqueued_job_is_pending_and_unknown_id_is_distinct() {
        let store = JobStore::new();
        let job = store.enqueue(new_job()).await;

        let snapshot = store.snapshot(job.id).await.expect("job is known");
        assert_eq!(snapshot.status, JobStatus::Pending);

        assert_eq!(store.snapshot(Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn claim_marks_running_and_drains_in_admission_order() {
        let store = JobStore::new();
        let first = store.enqueue(new_job()).await;
        let second = store.enqueue(new_job()).await;

        let claimed = store.claim_next().await.expect("a job is pending");
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());

        let claimed = store.claim_next().await.expect("a job is pending");
        assert_eq!(claimed.id, second.id);

        assert!(store.claim_next().await.is_none());
    }

    #[tokio::test]
    async fn terminal_state_is_sticky() {
        let store = JobStore::new();
        let job = store.enqueue(new_job()).await;
        store.claim_next().await.expect("claims");

        store.mark_succeeded(job.id).await;
        store.mark_failed(job.id, "too late").await;

        let snapshot = store.snapshot(job.id).await.expect("job is known");
        assert_eq!(snapshot.status, JobStatus::Succeeded);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn failed_job_keeps_its_message() {
        let store = JobStore::new();
        let job = store.enqueue(new_job()).await;
        store.claim_next().await.expect("claims");

        store.mark_failed(job.id, "required column missing").await;

        let snapshot = store.snapshot(job.id).await.expect("job is known");
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("required column missing"));
        assert!(snapshot.completed_at.is_some());
    }
}
