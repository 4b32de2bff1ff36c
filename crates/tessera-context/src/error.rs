//! Error types for context management

use tessera_vector::VectorError;
use thiserror::Error;

/// Context management error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Entry not found: {0}")]
    MissingEntry(String),

    #[error("Requested {requested} entries, limit is {max}")]
    BoundsExceeded { requested: usize, max: usize },

    #[error("Cannot compress entry while it is in use: {0}")]
    Compression(String),

    #[error("Cannot remove entry while it is in use: {0}")]
    EntryInUse(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index error: {0}")]
    Index(#[from] VectorError),
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;
