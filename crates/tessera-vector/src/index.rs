//! In-memory similarity search index

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::ContextEntry;
use tracing::trace;

use crate::embedder::{Embedder, HashingEmbedder};
use crate::error::{VectorError, VectorResult};
use crate::types::{SearchHit, Vector};

#[derive(Debug, Clone)]
struct IndexedVector {
    vector: Vector,
    sequence: u64,
}

/// One vector per entry, ranked by cosine similarity against a query
#[derive(Debug, Clone)]
pub struct SearchIndex {
    embedder: Arc<dyn Embedder>,
    vectors: HashMap<String, IndexedVector>,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }
}

impl SearchIndex {
    /// Empty index embedding with `embedder`
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            vectors: HashMap::new(),
        }
    }

    /// The embedding policy in use
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True if nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// True if `id` has a vector
    pub fn contains(&self, id: &str) -> bool {
        self.vectors.contains_key(id)
    }

    /// Embed `entry` and store its vector, replacing any previous one.
    ///
    /// Compressed entries are embedded from their summary alone, so this is
    /// also how compression is reflected in ranking.
    pub fn index(&mut self, entry: &ContextEntry) -> VectorResult<()> {
        let vector = self.embed(&entry.indexable_text())?;
        trace!(id = entry.id(), compressed = entry.is_compressed(), "Indexed entry");
        self.vectors.insert(
            entry.id().to_string(),
            IndexedVector {
                vector,
                sequence: entry.sequence(),
            },
        );
        Ok(())
    }

    /// Drop the vector for `id`. Returns false if none was indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.vectors.remove(id).is_some()
    }

    /// Top `k` entries scoring at least `min_score`, best first.
    ///
    /// Equal scores rank the earlier-inserted entry first. A score of zero
    /// means no shared features and is never returned.
    pub fn search(&self, query: &str, k: usize, min_score: f32) -> VectorResult<Vec<SearchHit>> {
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed(query)?;
        if query_vector.is_zero() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .map(|(id, indexed)| SearchHit {
                id: id.clone(),
                score: query_vector.cosine_similarity(&indexed.vector),
                sequence: indexed.sequence,
            })
            .filter(|hit| hit.score > 0.0 && hit.score >= min_score)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.sequence.cmp(&b.sequence)));
        hits.truncate(k);

        Ok(hits)
    }

    fn embed(&self, text: &str) -> VectorResult<Vector> {
        let vector = self.embedder.embed(text);
        let expected = self.embedder.dimension();
        if vector.dimensions != expected || vector.data.len() != expected {
            return Err(VectorError::InvalidDimension {
                expected,
                actual: vector.data.len(),
            });
        }
        Ok(vector)
    }
}
