//! Feature Store Contract

use crate::records::{
    CycleRecord, FeatureDefinition, FeatureValueUpdate, NewFeatureValue, StationProfile, StoredFeatureValue,
};
use crate::StorageError;
use async_trait::async_trait;

/// Persistence contract required by the registry, the synchronizer and the
/// unit enumeration.
///
/// Implementations keep `(cycle_id, feature_id, station_id)` unique and
/// assign feature ids in insertion order, never reusing one. A cycle has
/// at most one recorded date per station.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Full feature catalog, ordered by id
    async fn feature_catalog(&self) -> Result<Vec<FeatureDefinition>, StorageError>;

    /// Register new feature names, assigning ids in the given order
    async fn insert_features(&self, names: &[String]) -> Result<(), StorageError>;

    /// Stored values for `cycle_ids × feature_ids` at one station
    async fn fetch_values(
        &self,
        station_id: i64,
        cycle_ids: &[i64],
        feature_ids: &[i64],
    ) -> Result<Vec<StoredFeatureValue>, StorageError>;

    /// Multi-row insert; returns rows written
    async fn insert_values(&self, rows: &[NewFeatureValue]) -> Result<u64, StorageError>;

    /// Batched update by record id; returns rows written
    async fn update_values(&self, rows: &[FeatureValueUpdate]) -> Result<u64, StorageError>;

    /// Recorded dates of `cycle_ids` at one station, ordered by cycle id
    async fn fetch_cycles(
        &self,
        station_id: i64,
        cycle_ids: &[i64],
    ) -> Result<Vec<CycleRecord>, StorageError>;

    /// Record cycle dates, replacing an earlier date for the same cycle;
    /// returns rows written
    async fn upsert_cycles(&self, rows: &[CycleRecord]) -> Result<u64, StorageError>;

    /// Station profiles, ordered by id
    async fn stations(&self) -> Result<Vec<StationProfile>, StorageError>;
}
