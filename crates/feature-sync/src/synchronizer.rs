//! Versioned Diff-Based Synchronizer

use crate::error::SyncError;
use feature_engine::FeatureTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use storage::{FeatureStore, FeatureValueKey, FeatureValueUpdate, NewFeatureValue};
use tracing::{debug, info};

/// Write counts of one sync call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub batches: usize,
}

impl SyncReport {
    /// Rows written (inserted + updated)
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    /// Add another report's counts to this one
    pub fn merge(&mut self, other: &SyncReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.batches += other.batches;
    }
}

struct PendingValue {
    cycle_id: i64,
    feature_id: i64,
    value: Option<f64>,
}

/// Upserts feature tables so that each `(cycle, feature, station)` key holds
/// at most one row, stamped with the extractor version that produced it.
pub struct FeatureSynchronizer<S: FeatureStore + ?Sized> {
    store: Arc<S>,
}

impl<S: FeatureStore + ?Sized> FeatureSynchronizer<S> {
    /// Create a synchronizer over a feature store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Reconcile `table` with stored values for `station_id`.
    ///
    /// A stored row is updated when its value or its extractor version
    /// differs, and left alone otherwise. Batches are applied independently:
    /// a failure in one batch leaves earlier batches committed.
    pub async fn sync(
        &self,
        table: &FeatureTable,
        feature_ids: &HashMap<String, i64>,
        station_id: i64,
        extractor_version: &str,
        batch_size: usize,
    ) -> Result<SyncReport, SyncError> {
        if batch_size == 0 {
            return Err(SyncError::InvalidBatchSize);
        }

        let column_ids = table
            .columns()
            .iter()
            .map(|column| {
                feature_ids
                    .get(column)
                    .copied()
                    .ok_or_else(|| SyncError::UnknownFeature(column.clone()))
            })
            .collect::<Result<Vec<i64>, _>>()?;

        let pending: Vec<PendingValue> = table
            .rows()
            .iter()
            .flat_map(|row| {
                column_ids
                    .iter()
                    .zip(&row.values)
                    .map(move |(&feature_id, &value)| PendingValue {
                        cycle_id: row.cycle_id,
                        feature_id,
                        value: value.filter(|v| v.is_finite()),
                    })
            })
            .collect();

        info!(
            "Syncing {} feature values for station {} (version {}, batch size {})",
            pending.len(),
            station_id,
            extractor_version,
            batch_size
        );

        let mut report = SyncReport::default();
        for (index, batch) in pending.chunks(batch_size).enumerate() {
            let batch_report = self
                .sync_batch(batch, station_id, extractor_version)
                .await
                .map_err(|source| SyncError::Storage {
                    batch: index + 1,
                    source,
                })?;
            debug!(
                "Batch {}: {} inserted, {} updated, {} skipped",
                index + 1,
                batch_report.inserted,
                batch_report.updated,
                batch_report.skipped
            );
            report.merge(&batch_report);
        }

        info!(
            "Sync complete: {} inserted, {} updated, {} skipped in {} batches",
            report.inserted, report.updated, report.skipped, report.batches
        );
        Ok(report)
    }

    async fn sync_batch(
        &self,
        batch: &[PendingValue],
        station_id: i64,
        extractor_version: &str,
    ) -> Result<SyncReport, storage::StorageError> {
        let cycle_ids: Vec<i64> = batch
            .iter()
            .map(|p| p.cycle_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let feature_ids: Vec<i64> = batch
            .iter()
            .map(|p| p.feature_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let stored: HashMap<FeatureValueKey, _> = self
            .store
            .fetch_values(station_id, &cycle_ids, &feature_ids)
            .await?
            .into_iter()
            .map(|v| (v.key, v))
            .collect();

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut skipped = 0;
        for pending in batch {
            let key = FeatureValueKey {
                cycle_id: pending.cycle_id,
                feature_id: pending.feature_id,
                station_id,
            };
            match stored.get(&key) {
                None => inserts.push(NewFeatureValue {
                    key,
                    feature_value: pending.value,
                    extractor_version: extractor_version.to_string(),
                }),
                Some(existing)
                    if existing.feature_value != pending.value
                        || existing.extractor_version != extractor_version =>
                {
                    updates.push(FeatureValueUpdate {
                        record_id: existing.record_id,
                        feature_value: pending.value,
                        extractor_version: extractor_version.to_string(),
                    })
                }
                Some(_) => skipped += 1,
            }
        }

        if !inserts.is_empty() {
            self.store.insert_values(&inserts).await?;
        }
        if !updates.is_empty() {
            self.store.update_values(&updates).await?;
        }

        Ok(SyncReport {
            inserted: inserts.len() as u64,
            updated: updates.len() as u64,
            skipped,
            batches: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureRegistry;
    use feature_engine::FeatureRow;
    use std::collections::HashSet;
    use storage::{MemoryStore, StorageError};

    fn table(rows: &[(i64, [Option<f64>; 2])]) -> FeatureTable {
        FeatureTable::new(
            vec!["P1_mean".to_string(), "P1_std".to_string()],
            rows.iter()
                .map(|(cycle_id, values)| FeatureRow {
                    cycle_id: *cycle_id,
                    values: values.to_vec(),
                })
                .collect(),
        )
    }

    async fn setup(store: &Arc<MemoryStore>, table: &FeatureTable) -> HashMap<String, i64> {
        FeatureRegistry::new(store.clone())
            .resolve(table.columns())
            .await
            .unwrap()
    }

    fn sample() -> FeatureTable {
        table(&[
            (1, [Some(1.5), Some(0.5)]),
            (2, [Some(2.0), None]),
            (3, [Some(3.0), Some(0.0)]),
        ])
    }

    #[tokio::test]
    async fn test_first_sync_inserts_everything() {
        let store = Arc::new(MemoryStore::new());
        let features = sample();
        let ids = setup(&store, &features).await;

        let report = FeatureSynchronizer::new(store.clone())
            .sync(&features, &ids, 7, "v1", 4)
            .await
            .unwrap();

        assert_eq!(report.inserted, 6);
        assert_eq!(report.updated, 0);
        assert_eq!(report.batches, 2);
        assert_eq!(store.value_count(), 6);
    }

    #[tokio::test]
    async fn test_second_identical_sync_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let features = sample();
        let ids = setup(&store, &features).await;
        let sync = FeatureSynchronizer::new(store.clone());

        sync.sync(&features, &ids, 7, "v1", 100).await.unwrap();
        let writes = store.stats().write_calls;

        let report = sync.sync(&features, &ids, 7, "v1", 100).await.unwrap();
        assert_eq!(report.written(), 0);
        assert_eq!(report.skipped, 6);
        assert_eq!(store.stats().write_calls, writes);
    }

    #[tokio::test]
    async fn test_version_bump_updates_every_row() {
        let store = Arc::new(MemoryStore::new());
        let features = sample();
        let ids = setup(&store, &features).await;
        let sync = FeatureSynchronizer::new(store.clone());

        sync.sync(&features, &ids, 7, "v1", 100).await.unwrap();
        let report = sync.sync(&features, &ids, 7, "v2", 100).await.unwrap();

        assert_eq!(report.inserted, 0);
        assert_eq!(report.updated, 6);
        assert!(store.values().iter().all(|v| v.extractor_version == "v2"));
    }

    #[tokio::test]
    async fn test_changed_value_updates_only_that_cell() {
        let store = Arc::new(MemoryStore::new());
        let ids = setup(&store, &sample()).await;
        let sync = FeatureSynchronizer::new(store.clone());

        sync.sync(&sample(), &ids, 7, "v1", 100).await.unwrap();
        let changed = table(&[
            (1, [Some(1.5), Some(0.5)]),
            (2, [Some(2.0), Some(9.0)]),
            (3, [Some(3.0), Some(0.0)]),
        ]);
        let report = sync.sync(&changed, &ids, 7, "v1", 100).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 5);
    }

    #[tokio::test]
    async fn test_stations_are_kept_apart() {
        let store = Arc::new(MemoryStore::new());
        let features = sample();
        let ids = setup(&store, &features).await;
        let sync = FeatureSynchronizer::new(store.clone());

        sync.sync(&features, &ids, 7, "v1", 100).await.unwrap();
        let report = sync.sync(&features, &ids, 8, "v1", 100).await.unwrap();

        assert_eq!(report.inserted, 6);
        assert_eq!(store.value_count(), 12);
    }

    #[tokio::test]
    async fn test_keys_stay_unique_across_syncs() {
        let store = Arc::new(MemoryStore::new());
        let ids = setup(&store, &sample()).await;
        let sync = FeatureSynchronizer::new(store.clone());

        sync.sync(&sample(), &ids, 7, "v1", 2).await.unwrap();
        sync.sync(&table(&[(3, [None, None]), (4, [Some(1.0), None])]), &ids, 7, "v2", 3)
            .await
            .unwrap();
        sync.sync(&sample(), &ids, 7, "v3", 5).await.unwrap();

        let values = store.values();
        let keys: HashSet<_> = values.iter().map(|v| v.key).collect();
        assert_eq!(keys.len(), values.len());
        assert_eq!(values.len(), 8);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_earlier_batches() {
        let store = Arc::new(MemoryStore::new());
        let features = sample();
        let ids = setup(&store, &features).await;

        store.fail_writes_after(1);
        let err = FeatureSynchronizer::new(store.clone())
            .sync(&features, &ids, 7, "v1", 2)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Storage {
                batch: 2,
                source: StorageError::Query { .. }
            }
        ));
        assert_eq!(store.value_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_column_fails_before_writing() {
        let store = Arc::new(MemoryStore::new());
        let mut ids = HashMap::new();
        ids.insert("P1_mean".to_string(), 1);

        let err = FeatureSynchronizer::new(store.clone())
            .sync(&sample(), &ids, 7, "v1", 10)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::UnknownFeature(ref c) if c == "P1_std"));
        assert_eq!(store.stats().write_calls, 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = FeatureSynchronizer::new(store)
            .sync(&sample(), &HashMap::new(), 7, "v1", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidBatchSize));
    }
}
