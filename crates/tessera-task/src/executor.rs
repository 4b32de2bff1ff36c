//! Batch execution
//!
//! Runs batches one after another. Each batch gets a leased implementation
//! context over its entry union; the lease is dropped when the handler
//! returns, fails or unwinds.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_context::{ContextStore, ImplementationContext, ImplementationView};
use tracing::{info, warn};

use crate::batcher::{TaskBatch, TaskSpec};
use crate::error::{ExecutorError, ExecutorResult};

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult<R> {
    pub batch_index: usize,
    pub task_ids: Vec<String>,
    /// Empty when the batch failed
    pub task_results: HashMap<String, R>,
    pub error: Option<String>,
}

impl<R> BatchResult<R> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Work done for one batch inside its context
pub trait BatchHandler<R> {
    fn handle(&mut self, context: &ImplementationView, tasks: &[TaskSpec]) -> anyhow::Result<HashMap<String, R>>;
}

impl<R, F> BatchHandler<R> for F
where
    F: FnMut(&ImplementationView, &[TaskSpec]) -> anyhow::Result<HashMap<String, R>>,
{
    fn handle(&mut self, context: &ImplementationView, tasks: &[TaskSpec]) -> anyhow::Result<HashMap<String, R>> {
        self(context, tasks)
    }
}

/// Async counterpart of [`BatchHandler`]
#[async_trait]
pub trait AsyncBatchHandler<R: Send>: Send + Sync {
    async fn handle(&self, context: &ImplementationView, tasks: &[TaskSpec]) -> anyhow::Result<HashMap<String, R>>;
}

/// Sequential batch runner
pub struct BatchExecutor<'a> {
    context: ImplementationContext<'a>,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(context: ImplementationContext<'a>) -> Self {
        Self { context }
    }

    /// Executor with a default implementation context over `store`
    pub fn for_store(store: &'a ContextStore) -> Self {
        Self::new(ImplementationContext::new(store))
    }

    pub fn context(&self) -> &ImplementationContext<'a> {
        &self.context
    }

    /// Run every batch in order.
    ///
    /// A failed batch either stops the run with its error or, with
    /// `continue_on_error`, is recorded with its message and no results.
    pub fn execute_all<R, H>(
        &self,
        batches: &[TaskBatch],
        mut handler: H,
        continue_on_error: bool,
    ) -> ExecutorResult<Vec<BatchResult<R>>>
    where
        H: BatchHandler<R>,
    {
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            let outcome = self.run(batch, &mut handler);
            record(&mut results, batch, outcome, continue_on_error)?;
        }
        Ok(results)
    }

    /// Like [`execute_all`](Self::execute_all) for handlers that await
    pub async fn execute_all_async<R, H>(
        &self,
        batches: &[TaskBatch],
        handler: &H,
        continue_on_error: bool,
    ) -> ExecutorResult<Vec<BatchResult<R>>>
    where
        R: Send,
        H: AsyncBatchHandler<R> + ?Sized,
    {
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            let outcome = match self.context.request(&batch.entry_ids) {
                Ok(lease) => handler
                    .handle(&lease, &batch.tasks)
                    .await
                    .map_err(|error| ExecutorError::Handler {
                        batch: batch.index,
                        error,
                    }),
                Err(source) => Err(ExecutorError::Context {
                    batch: batch.index,
                    source,
                }),
            };
            record(&mut results, batch, outcome, continue_on_error)?;
        }
        Ok(results)
    }

    fn run<R, H>(&self, batch: &TaskBatch, handler: &mut H) -> ExecutorResult<HashMap<String, R>>
    where
        H: BatchHandler<R>,
    {
        let lease = self
            .context
            .request(&batch.entry_ids)
            .map_err(|source| ExecutorError::Context {
                batch: batch.index,
                source,
            })?;
        handler
            .handle(&lease, &batch.tasks)
            .map_err(|error| ExecutorError::Handler {
                batch: batch.index,
                error,
            })
    }
}

fn record<R>(
    results: &mut Vec<BatchResult<R>>,
    batch: &TaskBatch,
    outcome: ExecutorResult<HashMap<String, R>>,
    continue_on_error: bool,
) -> ExecutorResult<()> {
    match outcome {
        Ok(task_results) => {
            info!(
                batch = batch.index,
                tasks = batch.tasks.len(),
                entries = batch.entry_count(),
                "Batch completed"
            );
            results.push(BatchResult {
                batch_index: batch.index,
                task_ids: batch.task_ids(),
                task_results,
                error: None,
            });
            Ok(())
        }
        Err(err) if continue_on_error => {
            warn!(batch = batch.index, error = %err, "Batch failed, continuing");
            results.push(BatchResult {
                batch_index: batch.index,
                task_ids: batch.task_ids(),
                task_results: HashMap::new(),
                error: Some(err.to_string()),
            });
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Merge the results of every successful batch
pub fn get_all_task_results<R: Clone>(results: &[BatchResult<R>]) -> HashMap<String, R> {
    results
        .iter()
        .filter(|result| result.is_success())
        .flat_map(|result| result.task_results.iter().map(|(id, value)| (id.clone(), value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::TaskBatcher;
    use anyhow::bail;
    use tessera_core::{ContextEntry, EntryType};

    fn store_with(ids: &[&str]) -> ContextStore {
        let store = ContextStore::new();
        for id in ids {
            store
                .add(ContextEntry::new(*id, EntryType::File, "test", format!("entry {id}")).with_content(format!("body {id}")))
                .unwrap();
        }
        store
    }

    fn batches(cap: usize, tasks: Vec<TaskSpec>) -> Vec<TaskBatch> {
        TaskBatcher::new(cap).create_batches(tasks, false).unwrap()
    }

    fn echo(view: &ImplementationView, tasks: &[TaskSpec]) -> anyhow::Result<HashMap<String, usize>> {
        Ok(tasks.iter().map(|task| (task.id.clone(), view.entry_count)).collect())
    }

    #[test]
    fn test_handler_sees_batch_entries() {
        let store = store_with(&["a", "b", "c"]);
        let plan = batches(
            2,
            vec![
                TaskSpec::new("t1", "one").with_entries(["a", "b"]),
                TaskSpec::new("t2", "two").with_entries(["c"]),
            ],
        );

        let handler = |view: &ImplementationView, tasks: &[TaskSpec]| -> anyhow::Result<HashMap<String, String>> {
            let body = view.ids().collect::<Vec<_>>().join(",");
            Ok(tasks.iter().map(|task| (task.id.clone(), body.clone())).collect())
        };
        let results = BatchExecutor::for_store(&store).execute_all(&plan, handler, false).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].task_results["t1"], "a,b");
        assert_eq!(results[1].task_results["t2"], "c");
        assert!(results.iter().all(BatchResult::is_success));
    }

    #[test]
    fn test_failure_stops_run_without_continue() {
        let store = store_with(&["a", "b"]);
        let plan = batches(
            1,
            vec![
                TaskSpec::new("t1", "one").with_entries(["a"]),
                TaskSpec::new("t2", "two").with_entries(["b"]),
            ],
        );

        let mut calls = 0;
        let handler = |_: &ImplementationView, _: &[TaskSpec]| -> anyhow::Result<HashMap<String, ()>> {
            calls += 1;
            bail!("worker crashed")
        };
        let err = BatchExecutor::for_store(&store).execute_all(&plan, handler, false).unwrap_err();

        assert!(matches!(err, ExecutorError::Handler { batch: 0, .. }));
        assert!(err.to_string().contains("worker crashed"));
        assert_eq!(calls, 1);
        assert_eq!(store.get("a").unwrap().in_use(), 0);
    }

    #[test]
    fn test_missing_entry_counts_as_batch_failure() {
        let store = store_with(&["a"]);
        let plan = batches(
            1,
            vec![
                TaskSpec::new("t1", "one").with_entries(["ghost"]),
                TaskSpec::new("t2", "two").with_entries(["a"]),
            ],
        );

        let results = BatchExecutor::for_store(&store).execute_all(&plan, echo, true).unwrap();
        assert!(!results[0].is_success());
        assert!(results[0].error.as_deref().unwrap_or_default().contains("ghost"));
        assert!(results[1].is_success());

        let err = BatchExecutor::for_store(&store).execute_all(&plan, echo, false).unwrap_err();
        assert!(matches!(err, ExecutorError::Context { batch: 0, .. }));
        assert_eq!(err.batch(), 0);
    }

    #[test]
    fn test_all_task_results_skip_failed_batches() {
        let results = vec![
            BatchResult {
                batch_index: 0,
                task_ids: vec!["t1".to_string()],
                task_results: HashMap::from([("t1".to_string(), 1)]),
                error: None,
            },
            BatchResult {
                batch_index: 1,
                task_ids: vec!["t2".to_string()],
                task_results: HashMap::new(),
                error: Some("boom".to_string()),
            },
        ];

        let merged = get_all_task_results(&results);
        assert_eq!(merged, HashMap::from([("t1".to_string(), 1)]));
    }

    struct Counting;

    #[async_trait]
    impl AsyncBatchHandler<usize> for Counting {
        async fn handle(&self, context: &ImplementationView, tasks: &[TaskSpec]) -> anyhow::Result<HashMap<String, usize>> {
            tokio::task::yield_now().await;
            if tasks.iter().any(|task| task.id == "bad") {
                bail!("refused");
            }
            Ok(tasks.iter().map(|task| (task.id.clone(), context.entry_count)).collect())
        }
    }

    #[tokio::test]
    async fn test_async_execution_matches_sync_semantics() {
        let store = store_with(&["a", "b"]);
        let plan = batches(
            1,
            vec![
                TaskSpec::new("bad", "fails").with_entries(["a"]),
                TaskSpec::new("good", "works").with_entries(["b"]),
            ],
        );
        let executor = BatchExecutor::for_store(&store);

        let results = executor.execute_all_async(&plan, &Counting, true).await.unwrap();
        assert!(!results[0].is_success());
        assert_eq!(results[1].task_results["good"], 1);
        assert_eq!(store.stats().in_use, 0);

        let err = executor.execute_all_async(&plan, &Counting, false).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Handler { batch: 0, .. }));
    }
}
