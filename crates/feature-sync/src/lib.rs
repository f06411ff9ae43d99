//! Feature Synchronization
//!
//! Resolves feature names to stable ids, reconciles computed feature tables
//! against persisted values with a versioned diff-based upsert, and records
//! completed units of work in a durable progress ledger.

mod error;
mod ledger;
mod registry;
mod synchronizer;

pub use error::{LedgerError, RegistryError, SyncError};
pub use ledger::{ProgressLedger, UnitKey};
pub use registry::FeatureRegistry;
pub use synchronizer::{FeatureSynchronizer, SyncReport};
