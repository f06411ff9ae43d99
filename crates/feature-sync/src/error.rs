//! Synchronization Error Types

use std::path::PathBuf;
use storage::StorageError;
use thiserror::Error;

/// Errors raised by [`crate::FeatureRegistry`]
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Feature catalog access failed: {0}")]
    Storage(#[from] StorageError),

    /// Name still missing from the catalog after registration
    #[error("Feature {0} has no id after registration")]
    Unresolved(String),
}

/// Errors raised by [`crate::FeatureSynchronizer`]
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failure in batch `batch` (1-based); earlier batches stay committed
    #[error("Storage failure in batch {batch}: {source}")]
    Storage {
        batch: usize,
        #[source]
        source: StorageError,
    },

    /// Table column with no entry in the id mapping
    #[error("Feature column {0} has no registered id")]
    UnknownFeature(String),

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
}

/// Errors raised by [`crate::ProgressLedger`]
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to write ledger {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Serialization(#[from] serde_json::Error),
}
