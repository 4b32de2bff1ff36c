//! Error types for batching and execution

use tessera_context::ContextError;
use thiserror::Error;

/// Task batching error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Task {task_id} needs {required} entries, batch limit is {max}")]
    TaskTooLarge {
        task_id: String,
        required: usize,
        max: usize,
    },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),
}

/// Batch execution error type
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Batch {batch} could not open its context: {source}")]
    Context {
        batch: usize,
        #[source]
        source: ContextError,
    },

    #[error("Batch {batch} handler failed: {error:#}")]
    Handler { batch: usize, error: anyhow::Error },
}

impl ExecutorError {
    /// Index of the batch that failed
    pub fn batch(&self) -> usize {
        match self {
            Self::Context { batch, .. } | Self::Handler { batch, .. } => *batch,
        }
    }
}

/// Result type for batching
pub type BatchingResult<T> = Result<T, BatchError>;

/// Result type for execution
pub type ExecutorResult<T> = Result<T, ExecutorError>;
