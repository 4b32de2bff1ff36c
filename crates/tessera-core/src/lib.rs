//! Tessera Core - context entry model shared by every Tessera crate
//!
//! This crate provides:
//! - [`ContextEntry`] and the [`EntryType`] tags
//! - Pluggable token estimation

pub mod entry;
pub mod tokens;

pub use entry::{truncate_summary, ContextEntry, EntryType, ParseEntryTypeError};
pub use tokens::{CharRatioEstimator, TokenEstimator, DEFAULT_CHARS_PER_TOKEN};

pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
