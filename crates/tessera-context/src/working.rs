//! Summary-only view for the coordinating agent
//!
//! The coordinator sees every entry but never its content: [`EntrySummary`]
//! has no content field at all, so there is nothing to leak.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_core::{CharRatioEstimator, ContextEntry, EntryType, TokenEstimator};

use crate::config::ContextConfig;
use crate::error::ContextResult;
use crate::store::ContextStore;

/// Content-free projection of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: String,
    pub entry_type: EntryType,
    pub source: String,
    pub summary: String,
    pub compressed: bool,
}

impl From<&ContextEntry> for EntrySummary {
    fn from(entry: &ContextEntry) -> Self {
        Self {
            id: entry.id().to_string(),
            entry_type: entry.entry_type(),
            source: entry.source().to_string(),
            summary: entry.summary().to_string(),
            compressed: entry.is_compressed(),
        }
    }
}

/// A search match in the working view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryHit {
    pub entry: EntrySummary,
    pub score: f32,
}

/// Every entry's summary, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingView {
    pub entries: Vec<EntrySummary>,
    pub total_count: usize,
    /// Estimated cost of all summaries together
    pub summary_tokens: usize,
}

/// Builds the coordinator's view of a store
pub struct WorkingContext<'a> {
    store: &'a ContextStore,
    estimator: Arc<dyn TokenEstimator>,
    search_limit: usize,
    min_score: f32,
}

impl<'a> WorkingContext<'a> {
    pub fn new(store: &'a ContextStore) -> Self {
        Self::from_config(store, &ContextConfig::default())
    }

    pub fn from_config(store: &'a ContextStore, config: &ContextConfig) -> Self {
        Self {
            store,
            estimator: Arc::new(CharRatioEstimator::default()),
            search_limit: config.search_limit,
            min_score: config.min_score,
        }
    }

    pub fn with_estimator(mut self, estimator: impl TokenEstimator + 'static) -> Self {
        self.estimator = Arc::new(estimator);
        self
    }

    pub fn build(&self) -> WorkingView {
        let entries: Vec<EntrySummary> = self.store.entries().iter().map(EntrySummary::from).collect();
        let summary_tokens = entries
            .iter()
            .map(|entry| self.estimator.estimate(&entry.summary))
            .sum();
        WorkingView {
            total_count: entries.len(),
            entries,
            summary_tokens,
        }
    }

    /// Search with the configured result limit and score threshold
    pub fn search(&self, query: &str) -> ContextResult<Vec<SummaryHit>> {
        self.search_with(query, self.search_limit, self.min_score)
    }

    pub fn search_with(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> ContextResult<Vec<SummaryHit>> {
        Ok(self
            .store
            .search(query, max_results, min_score)?
            .into_iter()
            .map(|scored| SummaryHit {
                entry: EntrySummary::from(&scored.entry),
                score: scored.score,
            })
            .collect())
    }
}
