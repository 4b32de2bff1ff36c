//! Tessera Vector - similarity search over context entries
//!
//! This crate provides:
//! - `Embedder` trait for pluggable, deterministic text embeddings
//! - A feature-hashing default embedder
//! - `SearchIndex`, the per-entry vector index the context store delegates to

pub mod embedder;
pub mod error;
pub mod index;
pub mod types;

pub use embedder::{Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSION};
pub use error::{VectorError, VectorResult};
pub use index::SearchIndex;
pub use types::{SearchHit, Vector};

/// Prelude for common imports
pub mod prelude {
    pub use crate::embedder::{Embedder, HashingEmbedder};
    pub use crate::error::{VectorError, VectorResult};
    pub use crate::index::SearchIndex;
    pub use crate::types::{SearchHit, Vector};
}
