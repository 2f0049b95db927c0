//! Job-level error taxonomy.
//!
//! Errors are contained at the narrowest scope that can safely continue:
//! provider and cache failures never leave the resolver, a crashed batch
//! is isolated to its own rows, and only the variants below reach a
//! job's terminal state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// The required address column is absent. Listed columns give the
    /// submitter an immediate hint at the actual header row.
    #[error("required column {column:?} not found; available columns: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    /// The input artifact could not be read or parsed as a table.
    #[error("failed to read input table: {0}")]
    InvalidInput(String),

    /// The scheduler produced more results than addresses. Truncating
    /// silently would mis-align every following row, so this is fatal.
    #[error("scheduler produced {got} results for {expected} addresses")]
    TooManyResults { expected: usize, got: usize },

    /// The job was cancelled cooperatively between batches.
    #[error("job cancelled before completion")]
    Cancelled,

    /// Anything unexpected that escaped the pipeline.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl JobError {
    /// User-input errors are surfaced to the submitter synchronously and
    /// never enqueued or retried.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            JobError::MissingColumn { .. } | JobError::InvalidInput(_)
        )
    }
}
