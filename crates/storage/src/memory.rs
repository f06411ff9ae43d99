//! In-Memory Feature Store

use crate::records::{
    CycleRecord, FeatureDefinition, FeatureValueKey, FeatureValueUpdate, NewFeatureValue, StationProfile,
    StoredFeatureValue,
};
use crate::store::FeatureStore;
use crate::StorageError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Write counters, for asserting idempotence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Successful insert/update calls
    pub write_calls: usize,
    /// Rows inserted
    pub rows_inserted: usize,
    /// Rows updated
    pub rows_updated: usize,
    /// Fetch calls
    pub fetch_calls: usize,
}

#[derive(Default)]
struct MemoryState {
    features: Vec<FeatureDefinition>,
    next_feature_id: i64,
    values: HashMap<FeatureValueKey, StoredFeatureValue>,
    record_keys: HashMap<i64, FeatureValueKey>,
    next_record_id: i64,
    cycles: BTreeMap<(i64, i64), NaiveDate>,
    stations: Vec<StationProfile>,
    stats: WriteStats,
    /// Fail every write once this many writes have succeeded
    fail_writes_after: Option<usize>,
}

/// Feature store kept in process memory
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Creating in-memory feature store");
        Self {
            state: Mutex::new(MemoryState {
                next_feature_id: 1,
                next_record_id: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state.lock().map_err(|e| StorageError::Query {
            operation,
            message: format!("Lock error: {}", e),
        })
    }

    /// Register a station profile
    pub fn add_station(&self, profile: StationProfile) {
        if let Ok(mut state) = self.state.lock() {
            state.stations.retain(|s| s.station_id != profile.station_id);
            state.stations.push(profile);
            state.stations.sort_by_key(|s| s.station_id);
        }
    }

    /// Make every write fail after `successful_writes` more writes
    pub fn fail_writes_after(&self, successful_writes: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_writes_after = Some(state.stats.write_calls + successful_writes);
        }
    }

    /// Write counters so far
    pub fn stats(&self) -> WriteStats {
        self.state.lock().map(|s| s.stats).unwrap_or_default()
    }

    /// All stored values, ordered by record id
    pub fn values(&self) -> Vec<StoredFeatureValue> {
        let mut values: Vec<_> = self
            .state
            .lock()
            .map(|s| s.values.values().cloned().collect())
            .unwrap_or_default();
        values.sort_by_key(|v| v.record_id);
        values
    }

    /// Number of stored values
    pub fn value_count(&self) -> usize {
        self.state.lock().map(|s| s.values.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    fn check_write(&self, operation: &'static str) -> Result<(), StorageError> {
        match self.fail_writes_after {
            Some(limit) if self.stats.write_calls >= limit => Err(StorageError::Query {
                operation,
                message: "injected write failure".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn feature_catalog(&self) -> Result<Vec<FeatureDefinition>, StorageError> {
        Ok(self.lock("feature_catalog")?.features.clone())
    }

    async fn insert_features(&self, names: &[String]) -> Result<(), StorageError> {
        let mut state = self.lock("insert_features")?;

        let mut batch = HashSet::new();
        for name in names {
            if !batch.insert(name) || state.features.iter().any(|f| &f.feature_name == name) {
                return Err(StorageError::Constraint {
                    operation: "insert_features",
                    message: format!("feature_name '{}' already exists", name),
                });
            }
        }

        for name in names {
            let feature_id = state.next_feature_id;
            state.next_feature_id += 1;
            state.features.push(FeatureDefinition {
                feature_id,
                feature_name: name.clone(),
            });
            debug!("Registered feature {} as {}", name, feature_id);
        }
        Ok(())
    }

    async fn fetch_values(
        &self,
        station_id: i64,
        cycle_ids: &[i64],
        feature_ids: &[i64],
    ) -> Result<Vec<StoredFeatureValue>, StorageError> {
        let mut state = self.lock("fetch_values")?;
        state.stats.fetch_calls += 1;

        let cycles: HashSet<i64> = cycle_ids.iter().copied().collect();
        let features: HashSet<i64> = feature_ids.iter().copied().collect();
        Ok(state
            .values
            .values()
            .filter(|v| {
                v.key.station_id == station_id
                    && cycles.contains(&v.key.cycle_id)
                    && features.contains(&v.key.feature_id)
            })
            .cloned()
            .collect())
    }

    async fn insert_values(&self, rows: &[NewFeatureValue]) -> Result<u64, StorageError> {
        let mut state = self.lock("insert_values")?;
        state.check_write("insert_values")?;

        let mut batch = HashSet::new();
        for row in rows {
            if !batch.insert(row.key) || state.values.contains_key(&row.key) {
                return Err(StorageError::Constraint {
                    operation: "insert_values",
                    message: format!("duplicate key {:?}", row.key),
                });
            }
        }

        for row in rows {
            let record_id = state.next_record_id;
            state.next_record_id += 1;
            state.record_keys.insert(record_id, row.key);
            state.values.insert(
                row.key,
                StoredFeatureValue {
                    record_id,
                    key: row.key,
                    feature_value: row.feature_value,
                    extractor_version: row.extractor_version.clone(),
                },
            );
        }

        state.stats.write_calls += 1;
        state.stats.rows_inserted += rows.len();
        Ok(rows.len() as u64)
    }

    async fn update_values(&self, rows: &[FeatureValueUpdate]) -> Result<u64, StorageError> {
        let mut state = self.lock("update_values")?;
        state.check_write("update_values")?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let key = state.record_keys.get(&row.record_id).copied().ok_or_else(|| {
                StorageError::Query {
                    operation: "update_values",
                    message: format!("unknown record_id {}", row.record_id),
                }
            })?;
            keys.push(key);
        }

        for (row, key) in rows.iter().zip(keys) {
            if let Some(stored) = state.values.get_mut(&key) {
                stored.feature_value = row.feature_value;
                stored.extractor_version = row.extractor_version.clone();
            }
        }

        state.stats.write_calls += 1;
        state.stats.rows_updated += rows.len();
        Ok(rows.len() as u64)
    }

    async fn fetch_cycles(
        &self,
        station_id: i64,
        cycle_ids: &[i64],
    ) -> Result<Vec<CycleRecord>, StorageError> {
        let state = self.lock("fetch_cycles")?;
        let wanted: HashSet<i64> = cycle_ids.iter().copied().collect();
        Ok(state
            .cycles
            .range((station_id, i64::MIN)..=(station_id, i64::MAX))
            .filter(|((_, cycle_id), _)| wanted.contains(cycle_id))
            .map(|(&(station_id, cycle_id), &cycle_date)| CycleRecord {
                station_id,
                cycle_id,
                cycle_date,
            })
            .collect())
    }

    async fn upsert_cycles(&self, rows: &[CycleRecord]) -> Result<u64, StorageError> {
        let mut state = self.lock("upsert_cycles")?;
        for row in rows {
            state
                .cycles
                .insert((row.station_id, row.cycle_id), row.cycle_date);
        }
        Ok(rows.len() as u64)
    }

    async fn stations(&self) -> Result<Vec<StationProfile>, StorageError> {
        Ok(self.lock("stations")?.stations.clone())
    }
}
