//! Tessera Task - batching tasks by shared context and running the batches
//!
//! [`TaskBatcher`] groups tasks so each batch's entries fit one
//! implementation context. [`BatchExecutor`] then runs the batches in order,
//! leasing each batch's entries for the duration of its handler.

pub mod batcher;
pub mod error;
pub mod executor;

pub use batcher::{TaskBatch, TaskBatcher, TaskSpec};
pub use error::{BatchError, BatchingResult, ExecutorError, ExecutorResult};
pub use executor::{get_all_task_results, AsyncBatchHandler, BatchExecutor, BatchHandler, BatchResult};

/// Prelude for common imports
pub mod prelude {
    pub use crate::batcher::{TaskBatch, TaskBatcher, TaskSpec};
    pub use crate::error::{BatchError, ExecutorError};
    pub use crate::executor::{get_all_task_results, AsyncBatchHandler, BatchExecutor, BatchHandler, BatchResult};
}
