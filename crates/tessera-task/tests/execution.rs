use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::anyhow;
use tessera_context::prelude::*;
use tessera_task::prelude::*;

fn seeded_store() -> ContextStore {
    let store = ContextStore::new();
    for (id, body) in [
        ("a", "pub fn parse() {}"),
        ("b", "pub struct Lexer;"),
        ("c", "mod tests;"),
        ("d", "fn main() {}"),
    ] {
        store
            .add(ContextEntry::new(id, EntryType::File, format!("src/{id}.rs"), format!("file {id}")).with_content(body))
            .unwrap();
    }
    store
}

fn overlapping_plan() -> Vec<TaskBatch> {
    TaskBatcher::new(2)
        .create_batches(
            vec![
                TaskSpec::new("t1", "first").with_entries(["a", "b"]),
                TaskSpec::new("t2", "second").with_entries(["b", "c"]),
                TaskSpec::new("t3", "third").with_entries(["d"]),
            ],
            false,
        )
        .unwrap()
}

#[test]
fn overlapping_tasks_over_cap_get_their_own_batches() {
    let plan = overlapping_plan();

    assert_eq!(plan.len(), 3);
    assert_eq!(plan[0].task_ids(), vec!["t1"]);
    assert_eq!(plan[1].task_ids(), vec!["t2"]);
    assert_eq!(plan[2].task_ids(), vec!["t3"]);
    assert!(plan.iter().all(|batch| batch.entry_count() <= 2));
}

#[test]
fn continue_on_error_records_failure_and_runs_the_rest() {
    let store = seeded_store();
    let plan = overlapping_plan();

    let handler = |view: &ImplementationView, tasks: &[TaskSpec]| -> anyhow::Result<HashMap<String, String>> {
        if tasks.iter().any(|task| task.id == "t2") {
            return Err(anyhow!("model timed out"));
        }
        Ok(tasks
            .iter()
            .map(|task| (task.id.clone(), format!("{} entries", view.entry_count)))
            .collect())
    };
    let results = BatchExecutor::for_store(&store).execute_all(&plan, handler, true).unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert!(results[1].error.as_deref().unwrap_or_default().contains("model timed out"));
    assert!(results[1].task_results.is_empty());
    assert!(results[2].is_success());

    let merged = get_all_task_results(&results);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged["t1"], "2 entries");
    assert!(!merged.contains_key("t2"));
    assert_eq!(store.stats().in_use, 0);
}

#[test]
fn entries_are_pinned_only_while_their_batch_runs() {
    let store = seeded_store();
    let plan = overlapping_plan();

    let handler = |view: &ImplementationView, tasks: &[TaskSpec]| -> anyhow::Result<HashMap<String, Vec<u32>>> {
        let holds = ["a", "b", "c", "d"]
            .iter()
            .map(|id| store.get(id).map_or(0, |entry| entry.in_use()))
            .collect();
        assert!(view.ids().all(|id| store.get(id).is_some_and(|entry| entry.is_held())));
        Ok(HashMap::from([(tasks[0].id.clone(), holds)]))
    };
    let results = BatchExecutor::for_store(&store).execute_all(&plan, handler, false).unwrap();
    let merged = get_all_task_results(&results);

    assert_eq!(merged["t1"], vec![1, 1, 0, 0]);
    assert_eq!(merged["t2"], vec![0, 1, 1, 0]);
    assert_eq!(merged["t3"], vec![0, 0, 0, 1]);
    assert_eq!(store.stats().in_use, 0);
}

#[test]
fn panicking_handler_still_releases_the_batch() {
    let store = seeded_store();
    let plan = overlapping_plan();
    let executor = BatchExecutor::for_store(&store);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let handler = |_: &ImplementationView, _: &[TaskSpec]| -> anyhow::Result<HashMap<String, ()>> {
            panic!("worker panicked")
        };
        executor.execute_all(&plan, handler, true)
    }));

    assert!(outcome.is_err());
    assert_eq!(store.stats().in_use, 0);
    assert!(store.compress("a").unwrap());
}

#[test]
fn results_are_written_back_for_the_coordinator() {
    let store = seeded_store();
    let plan = overlapping_plan();
    for batch in &plan {
        for task in &batch.tasks {
            store.add(task.to_entry()).unwrap();
        }
    }

    let handler = |view: &ImplementationView, tasks: &[TaskSpec]| -> anyhow::Result<HashMap<String, String>> {
        Ok(tasks
            .iter()
            .map(|task| {
                let sources: Vec<&str> = view.entries.iter().map(|entry| entry.source.as_str()).collect();
                (task.id.clone(), format!("reviewed {}", sources.join(" and ")))
            })
            .collect())
    };
    let results = BatchExecutor::for_store(&store).execute_all(&plan, handler, false).unwrap();

    let mut merged: Vec<(String, String)> = get_all_task_results(&results).into_iter().collect();
    merged.sort();
    for (task_id, output) in merged {
        store
            .add(ContextEntry::task_result(task_id.as_str(), output, format!("result of {task_id}")))
            .unwrap();
    }

    let written = store.get_by_type(EntryType::TaskResult);
    assert_eq!(written.len(), 3);
    let t1 = store.get("task-result:t1").unwrap();
    assert_eq!(t1.source(), "t1");
    assert_eq!(t1.content(), Some("reviewed src/a.rs and src/b.rs"));
    assert_eq!(store.get_by_type(EntryType::Task).len(), 3);

    let view = WorkingContext::new(&store).build();
    assert_eq!(view.total_count, 10);
}

struct Stalled;

#[async_trait::async_trait]
impl AsyncBatchHandler<()> for Stalled {
    async fn handle(&self, _: &ImplementationView, _: &[TaskSpec]) -> anyhow::Result<HashMap<String, ()>> {
        std::future::pending::<()>().await;
        Ok(HashMap::new())
    }
}

#[test]
fn dropping_async_run_releases_the_open_batch() {
    let store = seeded_store();
    let plan = overlapping_plan();
    let executor = BatchExecutor::for_store(&store);

    let mut run = tokio_test::task::spawn(executor.execute_all_async(&plan, &Stalled, true));
    tokio_test::assert_pending!(run.poll());
    assert_eq!(store.get("a").unwrap().in_use(), 1);
    assert_eq!(store.get("b").unwrap().in_use(), 1);

    drop(run);
    assert_eq!(store.stats().in_use, 0);
}

#[test]
fn async_run_completes_on_a_blocking_executor() {
    struct Lengths;

    #[async_trait::async_trait]
    impl AsyncBatchHandler<usize> for Lengths {
        async fn handle(&self, view: &ImplementationView, tasks: &[TaskSpec]) -> anyhow::Result<HashMap<String, usize>> {
            Ok(tasks.iter().map(|task| (task.id.clone(), view.total_tokens)).collect())
        }
    }

    let store = seeded_store();
    let plan = overlapping_plan();
    let results = tokio_test::block_on(BatchExecutor::for_store(&store).execute_all_async(&plan, &Lengths, false)).unwrap();

    assert_eq!(get_all_task_results(&results).len(), 3);
    assert_eq!(store.stats().in_use, 0);
}
