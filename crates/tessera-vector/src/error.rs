//! Error types for the search index

use thiserror::Error;

/// Search index error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Result type for index operations
pub type VectorResult<T> = Result<T, VectorError>;
