use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio::time::sleep;
use tracing::{error, info};

use geocode_worker::{app::ComponentRegistry, config::Config, observability, queue::JobStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|s| s.as_str())
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                message,
                "panic occurred"
            );
        } else {
            error!(thread = thread_name, message, "panic occurred");
        }
    }));

    observability::init().context("failed to initialize tracing")?;
    let config = Config::from_env().context("failed to load configuration")?;
    let registry = ComponentRegistry::build(config).context("failed to build component registry")?;
    let queue = registry.queue();

    let inputs: Vec<String> = std::env::args().skip(1).collect();
    if inputs.is_empty() {
        // Daemon mode: keep claiming jobs submitted through the library
        // surface until interrupted.
        info!("worker running, press ctrl-c to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutting down");
        queue.shutdown();
        queue.join().await;
        return Ok(());
    }

    // One-shot mode: submit each file given on the command line and
    // poll until every job reaches a terminal state.
    let mut job_ids = Vec::new();
    for input in &inputs {
        let path = Path::new(input);
        let original = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input.csv");
        match queue.submit(path, original).await {
            Ok(id) => {
                info!(job_id = %id, input, "submitted");
                job_ids.push(id);
            }
            Err(e) => error!(input, error = %e, "submission rejected"),
        }
    }

    for id in job_ids {
        loop {
            let Some(job) = queue.snapshot(id).await else {
                error!(job_id = %id, "job vanished from the status store");
                break;
            };
            match job.status {
                JobStatus::Succeeded => {
                    info!(
                        job_id = %id,
                        output = %job.output_path.display(),
                        "job succeeded"
                    );
                    break;
                }
                JobStatus::Failed => {
                    error!(
                        job_id = %id,
                        error = job.error.as_deref().unwrap_or("unknown"),
                        "job failed"
                    );
                    break;
                }
                JobStatus::Pending | JobStatus::Running => sleep(Duration::from_millis(250)).await,
            }
        }
    }

    queue.shutdown();
    queue.join().await;
    Ok(())
}
