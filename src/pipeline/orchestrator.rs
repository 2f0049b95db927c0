//! Per-job pipeline driver: table in, geocoded table out.

use std::io::ErrorKind;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::JobError;
use crate::queue::Job;
use crate::resolver::{CoordinateResult, GeocodeSource};
use crate::table;

use super::batch::BatchScheduler;

/// Result counts by source, for the job summary log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub primary: u64,
    pub secondary: u64,
    pub cached: u64,
    pub empty: u64,
    pub failed: u64,
    pub batch_failed: u64,
    pub missing: u64,
}

impl SourceCounts {
    fn tally(results: &[CoordinateResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.source {
                GeocodeSource::Primary => counts.primary += 1,
                GeocodeSource::Secondary => counts.secondary += 1,
                GeocodeSource::Cached => counts.cached += 1,
                GeocodeSource::Empty => counts.empty += 1,
                GeocodeSource::Failed => counts.failed += 1,
                GeocodeSource::BatchFailed => counts.batch_failed += 1,
                GeocodeSource::Missing => counts.missing += 1,
            }
        }
        counts
    }
}

/// Summary statistics for one completed run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunStats {
    pub rows: usize,
    pub counts: SourceCounts,
    pub elapsed_secs: f64,
    pub rows_per_sec: f64,
}

/// Drives one job end to end: parse, validate, schedule, merge, persist.
pub struct PipelineOrchestrator {
    scheduler: BatchScheduler,
    address_column: String,
}

impl PipelineOrchestrator {
    #[must_use]
    pub fn new(scheduler: BatchScheduler, address_column: String) -> Self {
        Self {
            scheduler,
            address_column,
        }
    }

    /// Run the pipeline for one claimed job.
    ///
    /// The input artifact is removed afterwards on success *and* on
    /// failure; an artifact that cannot be removed is logged, not fatal.
    ///
    /// # Errors
    /// Returns the [`JobError`] that becomes the job's failure message.
    pub async fn run(&self, job: &Job, cancel: &CancellationToken) -> Result<RunStats, JobError> {
        let outcome = self.run_inner(job, cancel).await;

        if let Err(error) = tokio::fs::remove_file(&job.input_path).await {
            if error.kind() != ErrorKind::NotFound {
                warn!(
                    job_id = %job.id,
                    input = %job.input_path.display(),
                    error = %error,
                    "failed to clean up input artifact"
                );
            }
        }

        outcome
    }

    async fn run_inner(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<RunStats, JobError> {
        let started = Instant::now();

        // Cheapest check first: the missing address column is the most
        // common user error and must fail before any geocoding work.
        // Table I/O is blocking, so it runs off the async runtime.
        let input_path = job.input_path.clone();
        let mut table = tokio::task::spawn_blocking(move || table::read_table(&input_path))
            .await
            .map_err(|e| JobError::Fatal(anyhow::Error::new(e)))??;
        let column = table::require_column(&table, &self.address_column)?;
        let addresses = table.column_values(column);

        info!(
            job_id = %job.id,
            rows = addresses.len(),
            column = %self.address_column,
            "geocoding job started"
        );

        let results = self.scheduler.run(&addresses, cancel).await?;

        table.push_column(
            "lat",
            results
                .iter()
                .map(|r| r.lat.map(|v| v.to_string()).unwrap_or_default())
                .collect(),
        );
        table.push_column(
            "lng",
            results
                .iter()
                .map(|r| r.lng.map(|v| v.to_string()).unwrap_or_default())
                .collect(),
        );
        table.push_column(
            "geocoding_source",
            results.iter().map(|r| r.source.as_str().to_string()).collect(),
        );

        let output_path = job.output_path.clone();
        tokio::task::spawn_blocking(move || table::write_table(&table, &output_path))
            .await
            .map_err(|e| JobError::Fatal(anyhow::Error::new(e)))?
            .with_context(|| format!("failed to persist {}", job.output_path.display()))?;

        let elapsed_secs = started.elapsed().as_secs_f64();
        let rows = results.len();
        let stats = RunStats {
            rows,
            counts: SourceCounts::tally(&results),
            elapsed_secs,
            rows_per_sec: if elapsed_secs > 0.0 {
                rows as f64 / elapsed_secs
            } else {
                0.0
            },
        };

        info!(
            job_id = %job.id,
            rows = stats.rows,
            primary = stats.counts.primary,
            secondary = stats.counts.secondary,
            cached = stats.counts.cached,
            empty = stats.counts.empty,
            failed = stats.counts.failed,
            batch_failed = stats.counts.batch_failed,
            missing = stats.counts.missing,
            elapsed_secs = stats.elapsed_secs,
            rows_per_sec = stats.rows_per_sec,
            output = %job.output_path.display(),
            "geocoding job completed"
        );

        Ok(stats)
    }
}

// Integration coverage for the orchestrator lives in tests/pipeline_test.rs,
// which exercises it through the queue with real artifacts on disk.
