//! Bounded full-content view for worker agents
//!
//! A worker gets the full text of at most `max_entries` entries. Taking the
//! view through [`ImplementationContext::request`] also pins those entries
//! with a [`ContextLease`], so they cannot be compressed or expired while
//! the worker reads them. Dropping the lease releases the pins on every
//! path out of the scope, including `?`, panics and cancelled futures.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_core::{CharRatioEstimator, ContextEntry, EntryType, TokenEstimator};
use tracing::debug;

use crate::config::{ContextConfig, DEFAULT_MAX_ENTRIES};
use crate::error::{ContextError, ContextResult};
use crate::store::{unique_ids, ContextStore};

/// Full projection of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryContent {
    pub id: String,
    pub entry_type: EntryType,
    pub source: String,
    pub summary: String,
    /// Shared with the store; `None` for compressed entries
    pub content: Option<Arc<str>>,
}

impl EntryContent {
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl From<&ContextEntry> for EntryContent {
    fn from(entry: &ContextEntry) -> Self {
        Self {
            id: entry.id().to_string(),
            entry_type: entry.entry_type(),
            source: entry.source().to_string(),
            summary: entry.summary().to_string(),
            content: entry.shared_content(),
        }
    }
}

/// Requested entries with their content, in request order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImplementationView {
    pub entries: Vec<EntryContent>,
    pub entry_count: usize,
    /// Estimated cost of all summaries and contents together
    pub total_tokens: usize,
}

impl ImplementationView {
    pub fn get(&self, id: &str) -> Option<&EntryContent> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds bounded views over a store
pub struct ImplementationContext<'a> {
    store: &'a ContextStore,
    max_entries: usize,
    estimator: Arc<dyn TokenEstimator>,
}

impl<'a> ImplementationContext<'a> {
    pub fn new(store: &'a ContextStore) -> Self {
        Self {
            store,
            max_entries: DEFAULT_MAX_ENTRIES,
            estimator: Arc::new(CharRatioEstimator::default()),
        }
    }

    pub fn from_config(store: &'a ContextStore, config: &ContextConfig) -> Self {
        Self::new(store).with_max_entries(config.max_entries)
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_estimator(mut self, estimator: impl TokenEstimator + 'static) -> Self {
        self.estimator = Arc::new(estimator);
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn store(&self) -> &'a ContextStore {
        self.store
    }

    /// True if the distinct ids fit the bound and all exist
    pub fn validate_bounds<I, S>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = unique_ids(ids);
        ids.len() <= self.max_entries && ids.iter().all(|id| self.store.contains(id))
    }

    /// Snapshot the requested entries without pinning them
    pub fn build<I, S>(&self, ids: I) -> ContextResult<ImplementationView>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = unique_ids(ids);
        self.check_bounds(ids.len())?;
        self.assemble(&ids)
    }

    /// Pin the requested entries and build their view.
    ///
    /// The pins are held until the returned lease is dropped.
    pub fn request<I, S>(&self, ids: I) -> ContextResult<ContextLease<'a>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = unique_ids(ids);
        self.check_bounds(ids.len())?;
        self.store.acquire(&ids)?;

        let mut lease = ContextLease {
            store: self.store,
            ids,
            view: ImplementationView::default(),
        };
        lease.view = self.assemble(&lease.ids)?;
        debug!(
            entries = lease.view.entry_count,
            tokens = lease.view.total_tokens,
            "Opened implementation context"
        );
        Ok(lease)
    }

    /// Run `f` against a pinned view, releasing the pins afterwards
    pub fn with_request<I, S, T, F>(&self, ids: I, f: F) -> ContextResult<T>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(&ImplementationView) -> T,
    {
        let lease = self.request(ids)?;
        Ok(f(&lease))
    }

    fn check_bounds(&self, requested: usize) -> ContextResult<()> {
        if requested > self.max_entries {
            return Err(ContextError::BoundsExceeded {
                requested,
                max: self.max_entries,
            });
        }
        Ok(())
    }

    fn assemble(&self, ids: &[String]) -> ContextResult<ImplementationView> {
        let entries: Vec<EntryContent> = self
            .store
            .get_many(ids)?
            .iter()
            .map(EntryContent::from)
            .collect();
        let total_tokens = entries
            .iter()
            .map(|entry| {
                self.estimator.estimate(&entry.summary)
                    + entry.content().map_or(0, |content| self.estimator.estimate(content))
            })
            .sum();
        Ok(ImplementationView {
            entry_count: entries.len(),
            entries,
            total_tokens,
        })
    }
}

/// Pins on a set of entries, released on drop
#[derive(Debug)]
pub struct ContextLease<'a> {
    store: &'a ContextStore,
    ids: Vec<String>,
    view: ImplementationView,
}

impl ContextLease<'_> {
    pub fn view(&self) -> &ImplementationView {
        &self.view
    }

    /// Distinct ids this lease holds
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl Deref for ContextLease<'_> {
    type Target = ImplementationView;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

impl Drop for ContextLease<'_> {
    fn drop(&mut self) {
        self.store.release(&self.ids);
        debug!(entries = self.ids.len(), "Closed implementation context");
    }
}
