//! Embedding policies
//!
//! The index only needs a deterministic text → vector mapping. The default
//! [`HashingEmbedder`] hashes word tokens into a fixed number of buckets,
//! which is enough to rank entries by shared vocabulary without a model.

use std::fmt;

use crate::types::Vector;

/// Bucket count of the default embedder
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1024;

/// Deterministic text embedding used for both entries and queries
pub trait Embedder: Send + Sync + fmt::Debug {
    /// Short policy name for logs
    fn name(&self) -> &'static str;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed `text`; the same text always yields the same vector
    fn embed(&self, text: &str) -> Vector;
}

/// Feature-hashing bag-of-words embedder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

impl HashingEmbedder {
    /// Embedder with `dimension` buckets, at least one
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        (fnv1a(token.as_bytes()) % self.dimension as u64) as usize
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vector {
        let mut counts = vec![0u32; self.dimension];
        for token in tokenize(text) {
            counts[self.bucket(&token)] += 1;
        }

        // Sublinear term frequency keeps one repeated word from dominating.
        let data = counts
            .into_iter()
            .map(|count| if count == 0 { 0.0 } else { 1.0 + (count as f32).ln() })
            .collect();
        let mut vector = Vector::new(data);
        vector.normalize();
        vector
    }
}

/// Lower-cased alphanumeric runs of `text`
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// 64-bit FNV-1a; stable across platforms and releases
const fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}
