//! Task batching
//!
//! Groups tasks so that each batch's combined entry requirement fits inside
//! one implementation context. Placement is greedy: a task joins the batch
//! it shares the most entries with, as long as the batch stays under the cap.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tessera_context::config::DEFAULT_MAX_ENTRIES;
use tessera_context::ContextConfig;
use tessera_core::ContextEntry;
use tracing::{debug, info};

use crate::error::{BatchError, BatchingResult};

/// A unit of work and the entries it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub required_entry_ids: BTreeSet<String>,
    /// Lower runs earlier
    #[serde(default)]
    pub priority: i32,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            required_entry_ids: BTreeSet::new(),
            priority: 0,
        }
    }

    pub fn with_entries<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_entry_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The TASK entry recording this definition in a store
    pub fn to_entry(&self) -> ContextEntry {
        ContextEntry::task(self.id.as_str(), self.description.as_str())
    }
}

/// Tasks that share one implementation context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBatch {
    pub index: usize,
    pub tasks: Vec<TaskSpec>,
    /// Union of every task's required entries
    pub entry_ids: BTreeSet<String>,
}

impl TaskBatch {
    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|task| task.id.clone()).collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entry_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn overlap(&self, ids: &BTreeSet<String>) -> usize {
        ids.iter().filter(|id| self.entry_ids.contains(*id)).count()
    }

    fn union_len(&self, ids: &BTreeSet<String>) -> usize {
        self.entry_ids.len() + ids.len() - self.overlap(ids)
    }

    fn push(&mut self, task: TaskSpec) {
        self.entry_ids.extend(task.required_entry_ids.iter().cloned());
        self.tasks.push(task);
    }
}

/// Partitions tasks into capped batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskBatcher {
    max_entries_per_batch: usize,
}

impl Default for TaskBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl TaskBatcher {
    pub fn new(max_entries_per_batch: usize) -> Self {
        Self { max_entries_per_batch }
    }

    /// Use the same cap as the implementation contexts built from `config`
    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.max_entries)
    }

    pub fn max_entries_per_batch(&self) -> usize {
        self.max_entries_per_batch
    }

    /// Place every task into exactly one batch.
    ///
    /// With `sort_by_priority` the tasks are stably ordered by priority
    /// ascending, then by requirement size descending, before placement.
    /// Otherwise input order is kept. The output is deterministic for a
    /// given input.
    pub fn create_batches<I>(&self, tasks: I, sort_by_priority: bool) -> BatchingResult<Vec<TaskBatch>>
    where
        I: IntoIterator<Item = TaskSpec>,
    {
        let mut tasks: Vec<TaskSpec> = tasks.into_iter().collect();
        self.check(&tasks)?;

        if sort_by_priority {
            tasks.sort_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.required_entry_ids.len().cmp(&a.required_entry_ids.len()))
            });
        }

        let task_count = tasks.len();
        let mut batches: Vec<TaskBatch> = Vec::new();
        for task in tasks {
            match self.best_fit(&batches, &task.required_entry_ids) {
                Some(index) => {
                    debug!(task = %task.id, batch = index, "Task joined batch");
                    batches[index].push(task);
                }
                None => {
                    let index = batches.len();
                    debug!(task = %task.id, batch = index, "Task opened batch");
                    let mut batch = TaskBatch {
                        index,
                        ..TaskBatch::default()
                    };
                    batch.push(task);
                    batches.push(batch);
                }
            }
        }

        info!(
            tasks = task_count,
            batches = batches.len(),
            max_entries = self.max_entries_per_batch,
            "Created task batches"
        );
        Ok(batches)
    }

    fn check(&self, tasks: &[TaskSpec]) -> BatchingResult<()> {
        let mut seen = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(BatchError::DuplicateTask(task.id.clone()));
            }
            if task.required_entry_ids.len() > self.max_entries_per_batch {
                return Err(BatchError::TaskTooLarge {
                    task_id: task.id.clone(),
                    required: task.required_entry_ids.len(),
                    max: self.max_entries_per_batch,
                });
            }
        }
        Ok(())
    }

    /// Eligible batch with the largest overlap, lowest index on ties
    fn best_fit(&self, batches: &[TaskBatch], ids: &BTreeSet<String>) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (index, batch) in batches.iter().enumerate() {
            if batch.union_len(ids) > self.max_entries_per_batch {
                continue;
            }
            let overlap = batch.overlap(ids);
            if best.map_or(true, |(_, most)| overlap > most) {
                best = Some((index, overlap));
            }
        }
        best.map(|(index, _)| index)
    }
}
