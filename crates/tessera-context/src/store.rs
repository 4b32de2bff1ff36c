//! Central context store
//!
//! [`ContextStore`] owns every entry. All state sits behind one lock, so
//! the shared `in_use` and `ttl` counters are only ever changed by a single
//! writer holding the whole read-modify-write.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tessera_core::{ContextEntry, EntryType};
use tessera_vector::{Embedder, HashingEmbedder, SearchIndex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ContextConfig;
use crate::error::{ContextError, ContextResult};

/// An entry matched by a search, with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: ContextEntry,
    pub score: f32,
}

/// Outcome of one lifecycle pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStats {
    /// Entries whose TTL was decremented
    pub decremented: usize,
    /// Expired entries removed
    pub removed: usize,
    /// Expired entries kept because they are in use
    pub deferred: usize,
}

/// Counts describing the store's current contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub compressed: usize,
    pub in_use: usize,
    pub with_ttl: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, ContextEntry>,
    index: SearchIndex,
    next_sequence: u64,
}

impl StoreState {
    fn insert(&mut self, mut entry: ContextEntry) -> ContextResult<String> {
        let id = entry.id().to_string();
        if self.entries.contains_key(&id) {
            return Err(ContextError::DuplicateEntry(id));
        }

        entry.admit(self.next_sequence, Utc::now());
        self.index.index(&entry)?;
        self.next_sequence += 1;

        debug!(
            id = %id,
            entry_type = %entry.entry_type(),
            sequence = entry.sequence(),
            compressed = entry.is_compressed(),
            "Added context entry"
        );
        self.entries.insert(id.clone(), entry);
        Ok(id)
    }

    fn remove(&mut self, id: &str) -> Option<ContextEntry> {
        let entry = self.entries.remove(id)?;
        self.index.remove(id);
        Some(entry)
    }

    fn compress(&mut self, id: &str) -> ContextResult<bool> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| ContextError::MissingEntry(id.to_string()))?;

        if entry.is_compressed() {
            return Ok(false);
        }
        if entry.is_held() {
            return Err(ContextError::Compression(id.to_string()));
        }

        entry.compress();
        self.index.index(entry)?;
        debug!(id = %id, "Compressed context entry");
        Ok(true)
    }

    fn sorted<'a, I>(entries: I) -> Vec<ContextEntry>
    where
        I: Iterator<Item = &'a ContextEntry>,
    {
        let mut entries: Vec<ContextEntry> = entries.cloned().collect();
        entries.sort_by_key(ContextEntry::sequence);
        entries
    }
}

/// Owner of all context entries and their search index
#[derive(Debug, Default)]
pub struct ContextStore {
    state: RwLock<StoreState>,
}

impl ContextStore {
    /// Empty store using the default hashing embedder
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store ranking searches with `embedder`
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            state: RwLock::new(StoreState {
                entries: HashMap::new(),
                index: SearchIndex::new(embedder),
                next_sequence: 0,
            }),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::with_embedder(Arc::new(HashingEmbedder::new(config.embedding_dimension)))
    }

    /// Insert and index `entry`, returning its id
    pub fn add(&self, entry: ContextEntry) -> ContextResult<String> {
        validate(&entry)?;
        self.state.write().insert(entry)
    }

    /// Store the output of a command.
    ///
    /// The result entry's `source` is the command line, which is also how a
    /// kept COMMAND entry is linked to it. Returns the result entry's id.
    pub fn add_command_result(
        &self,
        command: impl Into<String>,
        result: impl Into<String>,
        summary: impl Into<String>,
        keep_command: bool,
    ) -> ContextResult<String> {
        let command = command.into();
        let result_entry = ContextEntry::command_result(
            format!("result-{}", Uuid::new_v4()),
            command.as_str(),
            result,
            summary,
        );
        validate(&result_entry)?;

        let command_entry =
            keep_command.then(|| ContextEntry::command(format!("cmd-{}", Uuid::new_v4()), command.as_str()));

        let mut state = self.state.write();
        let command_id = match command_entry {
            Some(entry) => Some(state.insert(entry)?),
            None => None,
        };
        match state.insert(result_entry) {
            Ok(id) => Ok(id),
            Err(err) => {
                if let Some(command_id) = command_id {
                    state.remove(&command_id);
                }
                Err(err)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<ContextEntry> {
        self.state.read().entries.get(id).cloned()
    }

    /// Entries for `ids` in the given order; fails on the first unknown id
    pub fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> ContextResult<Vec<ContextEntry>> {
        let state = self.state.read();
        ids.iter()
            .map(|id| {
                let id = id.as_ref();
                state
                    .entries
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ContextError::MissingEntry(id.to_string()))
            })
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Every entry in insertion order
    pub fn entries(&self) -> Vec<ContextEntry> {
        StoreState::sorted(self.state.read().entries.values())
    }

    /// Entries of one type in insertion order
    pub fn get_by_type(&self, entry_type: EntryType) -> Vec<ContextEntry> {
        let state = self.state.read();
        StoreState::sorted(
            state
                .entries
                .values()
                .filter(|entry| entry.entry_type() == entry_type),
        )
    }

    /// Rank entries against `query`, keeping at most `max_results` scoring
    /// at least `min_score`
    pub fn search(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> ContextResult<Vec<ScoredEntry>> {
        let state = self.state.read();
        let hits = state.index.search(query, max_results, min_score)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                state.entries.get(&hit.id).map(|entry| ScoredEntry {
                    entry: entry.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Drop an entry's content, keeping its summary.
    ///
    /// Returns false if the entry was already compressed.
    pub fn compress(&self, id: &str) -> ContextResult<bool> {
        self.state.write().compress(id)
    }

    /// Compress each id, skipping unknown or in-use ones. Returns how many
    /// entries were compressed by this call.
    pub fn compress_multiple<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.write();
        let mut compressed = 0;
        for id in ids {
            let id = id.as_ref();
            match state.compress(id) {
                Ok(true) => compressed += 1,
                Ok(false) => {}
                Err(ContextError::Compression(_)) => {
                    debug!(id = %id, "Skipped compressing entry in use");
                }
                Err(err) => warn!(id = %id, error = %err, "Skipped compressing entry"),
            }
        }
        compressed
    }

    /// Run one lifecycle pass: decrement every TTL and remove expired
    /// entries that are not in use
    pub fn process_turn(&self) -> TurnStats {
        let mut state = self.state.write();
        let mut stats = TurnStats::default();
        let mut expired = Vec::new();

        for entry in state.entries.values_mut() {
            if entry.tick().is_none() {
                continue;
            }
            stats.decremented += 1;
            if entry.is_expired() {
                if entry.is_held() {
                    stats.deferred += 1;
                } else {
                    expired.push(entry.id().to_string());
                }
            }
        }

        for id in &expired {
            state.remove(id);
            debug!(id = %id, "Expired context entry");
        }
        stats.removed = expired.len();

        if stats.decremented > 0 {
            info!(
                decremented = stats.decremented,
                removed = stats.removed,
                deferred = stats.deferred,
                remaining = state.entries.len(),
                "Processed turn"
            );
        }
        stats
    }

    /// Entries with `0 < ttl <= threshold`, in insertion order
    pub fn get_expiring_soon(&self, threshold: i64) -> Vec<ContextEntry> {
        let state = self.state.read();
        StoreState::sorted(
            state
                .entries
                .values()
                .filter(|entry| entry.ttl().is_some_and(|ttl| ttl > 0 && ttl <= threshold)),
        )
    }

    /// Entries still carrying content, in insertion order
    pub fn get_uncompressed(&self) -> Vec<ContextEntry> {
        let state = self.state.read();
        StoreState::sorted(state.entries.values().filter(|entry| !entry.is_compressed()))
    }

    /// Take one hold on each distinct id.
    ///
    /// All-or-nothing: if any id is unknown nothing is held.
    pub fn acquire<I, S>(&self, ids: I) -> ContextResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = unique_ids(ids);
        let mut state = self.state.write();
        if let Some(missing) = ids.iter().find(|id| !state.entries.contains_key(id.as_str())) {
            return Err(ContextError::MissingEntry(missing.clone()));
        }
        for id in &ids {
            if let Some(entry) = state.entries.get_mut(id) {
                entry.hold();
            }
        }
        debug!(count = ids.len(), "Acquired context entries");
        Ok(())
    }

    /// Give back one hold on each distinct id
    pub fn release<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = unique_ids(ids);
        let mut state = self.state.write();
        for id in &ids {
            match state.entries.get_mut(id) {
                Some(entry) => {
                    if !entry.unhold() {
                        warn!(id = %id, "Released context entry that was not held");
                    }
                }
                None => warn!(id = %id, "Released unknown context entry"),
            }
        }
        debug!(count = ids.len(), "Released context entries");
    }

    /// Delete an entry that is not in use
    pub fn remove(&self, id: &str) -> ContextResult<ContextEntry> {
        let mut state = self.state.write();
        match state.entries.get(id) {
            None => return Err(ContextError::MissingEntry(id.to_string())),
            Some(entry) if entry.is_held() => return Err(ContextError::EntryInUse(id.to_string())),
            Some(_) => {}
        }
        state
            .remove(id)
            .ok_or_else(|| ContextError::MissingEntry(id.to_string()))
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        state.entries.values().fold(
            StoreStats {
                total: state.entries.len(),
                ..StoreStats::default()
            },
            |mut stats, entry| {
                stats.compressed += usize::from(entry.is_compressed());
                stats.in_use += usize::from(entry.is_held());
                stats.with_ttl += usize::from(entry.ttl().is_some());
                stats
            },
        )
    }
}

fn validate(entry: &ContextEntry) -> ContextResult<()> {
    if entry.id().trim().is_empty() {
        return Err(ContextError::InvalidEntry("entry id cannot be empty".to_string()));
    }
    if entry.summary().trim().is_empty() {
        return Err(ContextError::InvalidEntry(format!(
            "entry {} has an empty summary",
            entry.id()
        )));
    }
    Ok(())
}

/// Distinct ids in first-occurrence order
pub(crate) fn unique_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter_map(|id| {
            let id = id.as_ref();
            seen.insert(id.to_string()).then(|| id.to_string())
        })
        .collect()
}
