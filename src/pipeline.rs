//! The batch geocoding pipeline: scheduler and per-job orchestrator.

pub mod batch;
pub mod orchestrator;

pub use batch::{BatchScheduler, BatchSettings};
pub use orchestrator::{PipelineOrchestrator, RunStats, SourceCounts};
