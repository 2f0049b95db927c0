//! End-to-end tests: submit real CSV artifacts through the queue and
//! assert on the geocoded output files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use uuid::Uuid;

use geocode_worker::{
    error::JobError,
    pipeline::{BatchScheduler, BatchSettings, PipelineOrchestrator},
    queue::{GeocodeJobQueue, JobStatus, QueueSettings},
    resolver::{AddressResolver, CoordinateResult, GeocodeSource},
    table,
};

/// Resolves "addr-N" to (N, -N) via the primary source; anything else
/// fails. Keeps tests order-sensitive without any network.
struct IndexResolver;

#[async_trait]
impl AddressResolver for IndexResolver {
    async fn resolve(&self, address: &str) -> CoordinateResult {
        if address.trim().is_empty() {
            return CoordinateResult::unlocated(GeocodeSource::Empty);
        }
        match address.rsplit('-').next().and_then(|s| s.parse::<f64>().ok()) {
            Some(n) => CoordinateResult::located(n, -n, GeocodeSource::Primary),
            None => CoordinateResult::unlocated(GeocodeSource::Failed),
        }
    }
}

/// Like [`IndexResolver`], but panics for every row of one batch to
/// simulate a crashed batch worker.
struct CrashingResolver {
    crash_batch_idx: usize,
    batch_size: usize,
}

#[async_trait]
impl AddressResolver for CrashingResolver {
    async fn resolve(&self, address: &str) -> CoordinateResult {
        let n: usize = address
            .rsplit('-')
            .next()
            .and_then(|s| s.parse().ok())
            .expect("test addresses carry an index");
        assert!(
            n / self.batch_size != self.crash_batch_idx,
            "simulated crash in batch {}",
            self.crash_batch_idx
        );
        CoordinateResult::located(n as f64, -(n as f64), GeocodeSource::Primary)
    }
}

/// Resolves slowly so tests can observe non-terminal states.
struct SlowResolver {
    delay: Duration,
}

#[async_trait]
impl AddressResolver for SlowResolver {
    async fn resolve(&self, _address: &str) -> CoordinateResult {
        sleep(self.delay).await;
        CoordinateResult::located(0.0, 0.0, GeocodeSource::Primary)
    }
}

struct Harness {
    dir: tempfile::TempDir,
    upload_dir: PathBuf,
    processed_dir: PathBuf,
    queue: Arc<GeocodeJobQueue>,
}

fn build_queue(resolver: Arc<dyn AddressResolver>, batch_size: usize) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let upload_dir = dir.path().join("uploads");
    let processed_dir = dir.path().join("processed");
    fs::create_dir_all(&upload_dir).expect("create upload dir");
    fs::create_dir_all(&processed_dir).expect("create processed dir");

    let scheduler = BatchScheduler::new(
        resolver,
        BatchSettings {
            batch_size,
            worker_count: 2,
            primary_pace: Duration::ZERO,
            secondary_pace: Duration::ZERO,
        },
    );
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        scheduler,
        "FULL_ADDRESS".to_string(),
    ));
    let queue = Arc::new(GeocodeJobQueue::new(
        orchestrator,
        QueueSettings {
            upload_dir: upload_dir.clone(),
            processed_dir: processed_dir.clone(),
            address_column: "FULL_ADDRESS".to_string(),
            poll_interval: Duration::from_millis(10),
            job_concurrency: 1,
        },
    ));

    Harness {
        dir,
        upload_dir,
        processed_dir,
        queue,
    }
}

fn write_input(dir: &Path, rows: usize) -> PathBuf {
    let mut content = String::from("name,FULL_ADDRESS\n");
    for i in 0..rows {
        content.push_str(&format!("row{i},addr-{i}\n"));
    }
    let path = dir.join("source.csv");
    fs::write(&path, content).expect("write input");
    path
}

async fn wait_terminal(harness: &Harness, id: Uuid) -> geocode_worker::queue::Job {
    for _ in 0..500 {
        let job = harness
            .queue
            .snapshot(id)
            .await
            .expect("submitted job is known");
        if matches!(job.status, JobStatus::Succeeded | JobStatus::Failed) {
            return job;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal state in time");
}

#[tokio::test]
async fn end_to_end_job_appends_geocoding_columns() {
    let harness = build_queue(Arc::new(IndexResolver), 8);
    let source = write_input(harness.dir.path(), 3);

    let id = harness
        .queue
        .submit(&source, "source.csv")
        .await
        .expect("submission succeeds");

    let job = wait_terminal(&harness, id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.error, None);

    let output = table::read_table(&job.output_path).expect("output reads");
    assert_eq!(
        output.headers(),
        ["name", "FULL_ADDRESS", "lat", "lng", "geocoding_source"]
    );
    assert_eq!(output.row_count(), 3);
    let lat_col = output.column_index("lat").expect("lat column exists");
    assert_eq!(
        output.column_values(lat_col),
        vec!["0".to_string(), "1".to_string(), "2".to_string()]
    );
    let source_col = output
        .column_index("geocoding_source")
        .expect("source column exists");
    assert!(
        output
            .column_values(source_col)
            .iter()
            .all(|v| v == "primary")
    );

    // The staged input artifact is cleaned up after processing.
    assert_eq!(job.input_path.parent(), Some(harness.upload_dir.as_path()));
    assert!(!job.input_path.exists());
    assert_eq!(
        job.output_path.parent(),
        Some(harness.processed_dir.as_path())
    );
}

#[tokio::test]
async fn crashed_middle_batch_only_poisons_its_own_rows() {
    // 17 rows, batch size 8 -> batches of 8, 8 and 1. Batch 1 crashes.
    let harness = build_queue(
        Arc::new(CrashingResolver {
            crash_batch_idx: 1,
            batch_size: 8,
        }),
        8,
    );
    let source = write_input(harness.dir.path(), 17);

    let id = harness
        .queue
        .submit(&source, "source.csv")
        .await
        .expect("submission succeeds");
    let job = wait_terminal(&harness, id).await;
    assert_eq!(job.status, JobStatus::Succeeded);

    let output = table::read_table(&job.output_path).expect("output reads");
    assert_eq!(output.row_count(), 17);
    let source_col = output
        .column_index("geocoding_source")
        .expect("source column exists");
    let lat_col = output.column_index("lat").expect("lat column exists");
    let sources = output.column_values(source_col);
    let lats = output.column_values(lat_col);

    for i in 0..17 {
        if (8..16).contains(&i) {
            assert_eq!(sources[i], "batch_failed", "row {i}");
            assert_eq!(lats[i], "", "row {i}");
        } else {
            assert_eq!(sources[i], "primary", "row {i}");
            assert_eq!(lats[i], i.to_string(), "row {i}");
        }
    }
}

#[tokio::test]
async fn missing_address_column_is_rejected_at_submission() {
    let harness = build_queue(Arc::new(IndexResolver), 8);
    let source = harness.dir.path().join("source.csv");
    fs::write(&source, "name,city\nAda,Madrid\n").expect("write input");

    let error = harness
        .queue
        .submit(&source, "source.csv")
        .await
        .expect_err("submission is rejected");

    match &error {
        JobError::MissingColumn { column, available } => {
            assert_eq!(column, "FULL_ADDRESS");
            assert_eq!(available, &["name".to_string(), "city".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(error.is_user_error());

    // Nothing was staged or enqueued.
    let staged: Vec<_> = fs::read_dir(&harness.upload_dir)
        .expect("upload dir readable")
        .collect();
    assert!(staged.is_empty());
}

#[tokio::test]
async fn submitted_filename_is_stripped_to_its_final_component() {
    let harness = build_queue(Arc::new(IndexResolver), 8);
    let source = write_input(harness.dir.path(), 1);

    let id = harness
        .queue
        .submit(&source, "../../escape.csv")
        .await
        .expect("submission succeeds");

    // Path components in the client-supplied name must not move the
    // artifacts out of their directories.
    let job = harness.queue.snapshot(id).await.expect("job is known");
    assert_eq!(job.original_filename, "escape.csv");
    assert_eq!(job.input_path.parent(), Some(harness.upload_dir.as_path()));

    let job = wait_terminal(&harness, id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(
        job.output_path.parent(),
        Some(harness.processed_dir.as_path())
    );
    assert!(job.output_path.exists());
}

#[tokio::test]
async fn unknown_job_id_is_distinct_from_an_admitted_one() {
    let harness = build_queue(
        Arc::new(SlowResolver {
            delay: Duration::from_millis(50),
        }),
        8,
    );
    let source = write_input(harness.dir.path(), 4);

    let id = harness
        .queue
        .submit(&source, "source.csv")
        .await
        .expect("submission succeeds");

    // Admitted id is always observable, whatever its current state.
    let known = harness.queue.snapshot(id).await;
    assert!(known.is_some());
    assert!(matches!(
        known.expect("known job").status,
        JobStatus::Pending | JobStatus::Running
    ));

    assert!(harness.queue.snapshot(Uuid::new_v4()).await.is_none());
}

#[tokio::test]
async fn terminal_state_survives_repeated_polling() {
    let harness = build_queue(Arc::new(IndexResolver), 8);
    let source = write_input(harness.dir.path(), 2);

    let id = harness
        .queue
        .submit(&source, "source.csv")
        .await
        .expect("submission succeeds");
    let first = wait_terminal(&harness, id).await;
    assert_eq!(first.status, JobStatus::Succeeded);

    for _ in 0..5 {
        let again = harness.queue.snapshot(id).await.expect("job is known");
        assert_eq!(again.status, first.status);
        assert_eq!(again.completed_at, first.completed_at);
    }
}

#[tokio::test]
async fn shutdown_cancels_a_running_job_at_a_batch_boundary() {
    let harness = build_queue(
        Arc::new(SlowResolver {
            delay: Duration::from_millis(30),
        }),
        2,
    );
    // 20 rows at 30ms each across 2 workers: several hundred ms of work.
    let source = write_input(harness.dir.path(), 20);

    let id = harness
        .queue
        .submit(&source, "source.csv")
        .await
        .expect("submission succeeds");

    // Let the worker claim the job, then request shutdown.
    sleep(Duration::from_millis(50)).await;
    harness.queue.shutdown();
    harness.queue.join().await;

    let job = harness.queue.snapshot(id).await.expect("job is known");
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error.expect("failure carries a message");
    assert!(message.contains("cancelled"), "got: {message}");
}
