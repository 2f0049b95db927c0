//! Batch scheduler: fans a list of addresses out over a small worker
//! pool and fans the results back in, preserving original row order.
//!
//! Batches complete in whatever order the pool finishes them; rows are
//! written back at `batch_idx * batch_size`, never in completion order.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::JobError;
use crate::resolver::{AddressResolver, CoordinateResult, GeocodeSource};

/// Scheduler settings.
///
/// `worker_count` is deliberately small by default: the primary provider
/// is free and its usage policy expects roughly one request per second
/// per client, which the pacing sleeps enforce per worker slot.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub worker_count: usize,
    /// Sleep after a request that reached the primary provider,
    /// whether or not it resolved.
    pub primary_pace: Duration,
    /// Sleep after a request resolved by the secondary provider.
    pub secondary_pace: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 8,
            worker_count: 2,
            primary_pace: Duration::from_millis(1000),
            secondary_pace: Duration::from_millis(100),
        }
    }
}

pub struct BatchScheduler {
    resolver: Arc<dyn AddressResolver>,
    settings: BatchSettings,
}

impl BatchScheduler {
    #[must_use]
    pub fn new(resolver: Arc<dyn AddressResolver>, settings: BatchSettings) -> Self {
        assert!(settings.batch_size > 0, "batch size must be non-zero");
        assert!(settings.worker_count > 0, "worker count must be non-zero");
        Self { resolver, settings }
    }

    /// Resolve every address, returning exactly one result per input row
    /// in the input's order.
    ///
    /// A batch whose worker task crashes contributes `batch_failed` rows
    /// instead of aborting the run. Cancellation is honored at batch
    /// boundaries only: batches already running finish, the rest are
    /// skipped and the run fails as cancelled.
    ///
    /// # Errors
    /// Returns [`JobError::TooManyResults`] on an accounting overflow and
    /// [`JobError::Cancelled`] when the token fired mid-run.
    pub async fn run(
        &self,
        addresses: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<CoordinateResult>, JobError> {
        let total = addresses.len();
        let batch_size = self.settings.batch_size;
        let semaphore = Arc::new(Semaphore::new(self.settings.worker_count));
        let mut in_flight = FuturesUnordered::new();

        for (batch_idx, chunk) in addresses.chunks(batch_size).enumerate() {
            let batch: Vec<String> = chunk.to_vec();
            let batch_len = batch.len();
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let settings = self.settings;

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("batch semaphore closed");
                if cancel.is_cancelled() {
                    debug!(batch_idx, "skipping batch, run cancelled");
                    return Vec::new();
                }
                resolve_batch(resolver.as_ref(), batch_idx, &batch, settings).await
            });

            in_flight.push(async move { (batch_idx, batch_len, handle.await) });
        }

        // Accumulate in completion order, place by batch index.
        let mut results = vec![CoordinateResult::unlocated(GeocodeSource::Missing); total];
        while let Some((batch_idx, batch_len, joined)) = in_flight.next().await {
            let batch_results = match joined {
                Ok(resolved) => resolved,
                Err(error) => {
                    warn!(
                        batch_idx,
                        batch_len,
                        error = %error,
                        "batch worker crashed, substituting batch_failed rows"
                    );
                    vec![CoordinateResult::unlocated(GeocodeSource::BatchFailed); batch_len]
                }
            };

            let offset = batch_idx * batch_size;
            if offset + batch_results.len() > total {
                return Err(JobError::TooManyResults {
                    expected: total,
                    got: offset + batch_results.len(),
                });
            }
            for (i, result) in batch_results.into_iter().enumerate() {
                results[offset + i] = result;
            }
        }

        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let missing = results
            .iter()
            .filter(|r| r.source == GeocodeSource::Missing)
            .count();
        if missing > 0 {
            warn!(missing, total, "padded short result set with missing rows");
        }

        Ok(results)
    }
}

/// Resolve one batch sequentially, pacing requests that actually reached
/// a provider. Only cache hits and empty rows skip the sleep.
async fn resolve_batch(
    resolver: &dyn AddressResolver,
    batch_idx: usize,
    batch: &[String],
    settings: BatchSettings,
) -> Vec<CoordinateResult> {
    debug!(batch_idx, batch_len = batch.len(), "batch started");
    let mut results = Vec::with_capacity(batch.len());

    for address in batch {
        let result = resolver.resolve(address).await;
        // A failed row still queried the primary provider, so it gets
        // the same courtesy delay as a hit.
        let pause = match result.source {
            GeocodeSource::Primary | GeocodeSource::Failed => settings.primary_pace,
            GeocodeSource::Secondary => settings.secondary_pace,
            _ => Duration::ZERO,
        };
        results.push(result);
        if !pause.is_zero() {
            sleep(pause).await;
        }
    }

    debug!(batch_idx, "batch completed");
    results
}
