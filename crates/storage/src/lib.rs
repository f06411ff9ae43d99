//! Storage Layer
//!
//! Persistence contract for the feature catalog, extracted feature values,
//! cycle dates and station profiles, with a SQLite transport and an in-memory store.

mod memory;
mod records;
mod retry;
mod sqlite;
mod store;

pub use memory::{MemoryStore, WriteStats};
pub use records::{
    CycleRecord, FeatureDefinition, FeatureValueKey, FeatureValueUpdate, NewFeatureValue, StationProfile,
    StoredFeatureValue,
};
pub use retry::RetryPolicy;
pub use sqlite::SqliteStore;
pub use store::FeatureStore;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection, timeout or busy database; worth retrying
    #[error("Transient storage error during {operation}: {message}")]
    Transient {
        operation: &'static str,
        message: String,
    },
    /// Transient failures that outlived the retry budget
    #[error("Storage operation {operation} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        message: String,
    },
    /// Malformed query or other permanent failure
    #[error("Query error during {operation}: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },
    /// Unique or foreign key constraint violated
    #[error("Constraint violation during {operation}: {message}")]
    Constraint {
        operation: &'static str,
        message: String,
    },
}

impl StorageError {
    /// True if the transport may retry the operation
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient { .. })
    }
}
