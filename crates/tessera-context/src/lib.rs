//! Tessera Context Management - the central entry store and its views
//!
//! This crate provides:
//! - `ContextStore`, owner of every entry and its lifecycle (TTL, compression, holds)
//! - `WorkingContext`, a summary-only view for the coordinating agent
//! - `ImplementationContext`, a bounded full-content view with scoped leases

pub mod config;
pub mod error;
pub mod implementation;
pub mod store;
pub mod working;

pub use config::ContextConfig;
pub use error::{ContextError, ContextResult};
pub use implementation::{ContextLease, EntryContent, ImplementationContext, ImplementationView};
pub use store::{ContextStore, ScoredEntry, StoreStats, TurnStats};
pub use working::{EntrySummary, SummaryHit, WorkingContext, WorkingView};

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::ContextConfig;
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::implementation::{ContextLease, ImplementationContext, ImplementationView};
    pub use crate::store::ContextStore;
    pub use crate::working::{WorkingContext, WorkingView};
    pub use tessera_core::{ContextEntry, EntryType};
}
