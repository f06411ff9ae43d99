//! SQLite Feature Store

use crate::records::{
    CycleRecord, FeatureDefinition, FeatureValueKey, FeatureValueUpdate, NewFeatureValue, StationProfile,
    StoredFeatureValue,
};
use crate::retry::RetryPolicy;
use crate::store::FeatureStore;
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

/// Rows per multi-row INSERT statement (at most 5 bind parameters each)
const INSERT_CHUNK_ROWS: usize = 1000;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS feature_list (
        feature_id INTEGER PRIMARY KEY AUTOINCREMENT,
        feature_name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS feature_values (
        record_id INTEGER PRIMARY KEY AUTOINCREMENT,
        cycle_id INTEGER NOT NULL,
        feature_id INTEGER NOT NULL REFERENCES feature_list(feature_id),
        station_id INTEGER NOT NULL,
        feature_value REAL,
        extractor_version TEXT NOT NULL,
        UNIQUE (cycle_id, feature_id, station_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_feature_values_station
        ON feature_values (station_id, cycle_id)",
    "CREATE TABLE IF NOT EXISTS cycles (
        station_id INTEGER NOT NULL,
        cycle_id INTEGER NOT NULL,
        cycle_date TEXT NOT NULL,
        PRIMARY KEY (station_id, cycle_id)
    )",
    "CREATE TABLE IF NOT EXISTS stations (
        station_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

/// Feature store backed by a SQLite pool
pub struct SqliteStore {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SqliteStore {
    /// Connect to an existing database at `url` (e.g. `sqlite://features.db`)
    pub async fn connect(url: &str, retry: RetryPolicy) -> Result<Self, StorageError> {
        Self::open(url, retry, false).await
    }

    /// Connect to `url`, creating the database file if it is missing
    pub async fn connect_or_create(url: &str, retry: RetryPolicy) -> Result<Self, StorageError> {
        Self::open(url, retry, true).await
    }

    async fn open(url: &str, retry: RetryPolicy, create: bool) -> Result<Self, StorageError> {
        info!("Connecting to feature store at {}", url);
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| classify("connect", e))?
            .create_if_missing(create)
            .foreign_keys(true);

        // One long-lived connection keeps `sqlite::memory:` databases alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| classify("connect", e))?;

        Ok(Self { pool, retry })
    }

    /// Create tables and indexes if they do not exist
    pub async fn create_schema(&self) -> Result<(), StorageError> {
        info!("Bootstrapping feature store schema");
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| classify("create_schema", e))?;
        }
        Ok(())
    }

    /// Insert or replace a station profile
    pub async fn add_station(&self, profile: &StationProfile) -> Result<(), StorageError> {
        sqlx::query("INSERT OR REPLACE INTO stations (station_id, name, created_at) VALUES (?, ?, ?)")
            .bind(profile.station_id)
            .bind(&profile.name)
            .bind(profile.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify("add_station", e))?;
        Ok(())
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a driver error onto the storage taxonomy
fn classify(operation: &'static str, err: sqlx::Error) -> StorageError {
    let message = err.to_string();
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageError::Transient { operation, message },
        sqlx::Error::Database(db) => {
            if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
            {
                return StorageError::Constraint { operation, message };
            }
            // SQLITE_BUSY / SQLITE_LOCKED, including extended codes
            let primary = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(5) | Some(6) => StorageError::Transient { operation, message },
                _ => StorageError::Query { operation, message },
            }
        }
        _ => StorageError::Query { operation, message },
    }
}

async fn select_catalog(pool: &SqlitePool) -> Result<Vec<FeatureDefinition>, sqlx::Error> {
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT feature_id, feature_name FROM feature_list ORDER BY feature_id")
            .fetch_all(pool)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(feature_id, feature_name)| FeatureDefinition {
            feature_id,
            feature_name,
        })
        .collect())
}

async fn insert_feature_names(pool: &SqlitePool, names: &[String]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for name in names {
        sqlx::query("INSERT INTO feature_list (feature_name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

async fn select_values(
    pool: &SqlitePool,
    station_id: i64,
    cycle_ids: &[i64],
    feature_ids: &[i64],
) -> Result<Vec<StoredFeatureValue>, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT record_id, cycle_id, feature_id, station_id, feature_value, extractor_version \
         FROM feature_values WHERE station_id = ",
    );
    query.push_bind(station_id);

    query.push(" AND cycle_id IN (");
    let mut cycles = query.separated(", ");
    for cycle_id in cycle_ids {
        cycles.push_bind(*cycle_id);
    }
    cycles.push_unseparated(")");

    query.push(" AND feature_id IN (");
    let mut features = query.separated(", ");
    for feature_id in feature_ids {
        features.push_bind(*feature_id);
    }
    features.push_unseparated(")");

    let rows: Vec<(i64, i64, i64, i64, Option<f64>, String)> =
        query.build_query_as().fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(
            |(record_id, cycle_id, feature_id, station_id, feature_value, extractor_version)| {
                StoredFeatureValue {
                    record_id,
                    key: FeatureValueKey {
                        cycle_id,
                        feature_id,
                        station_id,
                    },
                    feature_value,
                    extractor_version,
                }
            },
        )
        .collect())
}

async fn insert_value_rows(pool: &SqlitePool, rows: &[NewFeatureValue]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut written = 0;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO feature_values \
             (cycle_id, feature_id, station_id, feature_value, extractor_version) ",
        );
        query.push_values(chunk, |mut b, row| {
            b.push_bind(row.key.cycle_id)
                .push_bind(row.key.feature_id)
                .push_bind(row.key.station_id)
                .push_bind(row.feature_value)
                .push_bind(row.extractor_version.clone());
        });
        written += query.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

async fn update_value_rows(
    pool: &SqlitePool,
    rows: &[FeatureValueUpdate],
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut written = 0;
    for row in rows {
        written += sqlx::query(
            "UPDATE feature_values SET feature_value = ?, extractor_version = ? WHERE record_id = ?",
        )
        .bind(row.feature_value)
        .bind(&row.extractor_version)
        .bind(row.record_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

async fn select_cycles(
    pool: &SqlitePool,
    station_id: i64,
    cycle_ids: &[i64],
) -> Result<Vec<CycleRecord>, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT station_id, cycle_id, cycle_date FROM cycles WHERE station_id = ");
    query.push_bind(station_id);

    query.push(" AND cycle_id IN (");
    let mut cycles = query.separated(", ");
    for cycle_id in cycle_ids {
        cycles.push_bind(*cycle_id);
    }
    cycles.push_unseparated(")");
    query.push(" ORDER BY cycle_id");

    let rows: Vec<(i64, i64, NaiveDate)> = query.build_query_as().fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|(station_id, cycle_id, cycle_date)| CycleRecord {
            station_id,
            cycle_id,
            cycle_date,
        })
        .collect())
}

async fn upsert_cycle_rows(pool: &SqlitePool, rows: &[CycleRecord]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut written = 0;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO cycles (station_id, cycle_id, cycle_date) ");
        query.push_values(chunk, |mut b, row| {
            b.push_bind(row.station_id)
                .push_bind(row.cycle_id)
                .push_bind(row.cycle_date);
        });
        query.push(
            " ON CONFLICT (station_id, cycle_id) DO UPDATE SET cycle_date = excluded.cycle_date",
        );
        written += query.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

async fn select_stations(pool: &SqlitePool) -> Result<Vec<StationProfile>, sqlx::Error> {
    let rows: Vec<(i64, String, DateTime<Utc>)> =
        sqlx::query_as("SELECT station_id, name, created_at FROM stations ORDER BY station_id")
            .fetch_all(pool)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(station_id, name, created_at)| StationProfile {
            station_id,
            name,
            created_at,
        })
        .collect())
}

#[async_trait]
impl FeatureStore for SqliteStore {
    async fn feature_catalog(&self) -> Result<Vec<FeatureDefinition>, StorageError> {
        let pool = &self.pool;
        self.retry
            .run("feature_catalog", move || async move {
                select_catalog(pool)
                    .await
                    .map_err(|e| classify("feature_catalog", e))
            })
            .await
    }

    async fn insert_features(&self, names: &[String]) -> Result<(), StorageError> {
        if names.is_empty() {
            return Ok(());
        }
        debug!("Registering {} feature names", names.len());
        let pool = &self.pool;
        self.retry
            .run("insert_features", move || async move {
                insert_feature_names(pool, names)
                    .await
                    .map_err(|e| classify("insert_features", e))
            })
            .await
    }

    async fn fetch_values(
        &self,
        station_id: i64,
        cycle_ids: &[i64],
        feature_ids: &[i64],
    ) -> Result<Vec<StoredFeatureValue>, StorageError> {
        if cycle_ids.is_empty() || feature_ids.is_empty() {
            return Ok(Vec::new());
        }
        let pool = &self.pool;
        self.retry
            .run("fetch_values", move || async move {
                select_values(pool, station_id, cycle_ids, feature_ids)
                    .await
                    .map_err(|e| classify("fetch_values", e))
            })
            .await
    }

    async fn insert_values(&self, rows: &[NewFeatureValue]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let pool = &self.pool;
        self.retry
            .run("insert_values", move || async move {
                insert_value_rows(pool, rows)
                    .await
                    .map_err(|e| classify("insert_values", e))
            })
            .await
    }

    async fn update_values(&self, rows: &[FeatureValueUpdate]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let pool = &self.pool;
        self.retry
            .run("update_values", move || async move {
                update_value_rows(pool, rows)
                    .await
                    .map_err(|e| classify("update_values", e))
            })
            .await
    }

    async fn fetch_cycles(
        &self,
        station_id: i64,
        cycle_ids: &[i64],
    ) -> Result<Vec<CycleRecord>, StorageError> {
        if cycle_ids.is_empty() {
            return Ok(Vec::new());
        }
        let pool = &self.pool;
        self.retry
            .run("fetch_cycles", move || async move {
                select_cycles(pool, station_id, cycle_ids)
                    .await
                    .map_err(|e| classify("fetch_cycles", e))
            })
            .await
    }

    async fn upsert_cycles(&self, rows: &[CycleRecord]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let pool = &self.pool;
        self.retry
            .run("upsert_cycles", move || async move {
                upsert_cycle_rows(pool, rows)
                    .await
                    .map_err(|e| classify("upsert_cycles", e))
            })
            .await
    }

    async fn stations(&self) -> Result<Vec<StationProfile>, StorageError> {
        let pool = &self.pool;
        self.retry
            .run("stations", move || async move {
                select_stations(pool)
                    .await
                    .map_err(|e| classify("stations", e))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn memory_store() -> SqliteStore {
        let store = SqliteStore::connect_or_create("sqlite::memory:", RetryPolicy::none())
            .await
            .unwrap();
        store.create_schema().await.unwrap();
        store
    }

    fn new_value(cycle_id: i64, feature_id: i64, value: Option<f64>) -> NewFeatureValue {
        NewFeatureValue {
            key: FeatureValueKey {
                cycle_id,
                feature_id,
                station_id: 7,
            },
            feature_value: value,
            extractor_version: "v1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let store = memory_store().await;
        store.create_schema().await.unwrap();
        assert!(store.feature_catalog().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feature_ids_follow_insertion_order() {
        let store = memory_store().await;
        store
            .insert_features(&["b".to_string(), "a".to_string()])
            .await
            .unwrap();

        let catalog = store.feature_catalog().await.unwrap();
        assert_eq!(catalog[0].feature_name, "b");
        assert_eq!(catalog[0].feature_id, 1);
        assert_eq!(catalog[1].feature_name, "a");
        assert_eq!(catalog[1].feature_id, 2);
    }

    #[tokio::test]
    async fn test_duplicate_feature_name_is_constraint() {
        let store = memory_store().await;
        store.insert_features(&["a".to_string()]).await.unwrap();
        let err = store.insert_features(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));
    }

    #[tokio::test]
    async fn test_values_round_trip_with_null() {
        let store = memory_store().await;
        store
            .insert_features(&["x".to_string(), "y".to_string()])
            .await
            .unwrap();

        let written = store
            .insert_values(&[
                new_value(1, 1, Some(1.5)),
                new_value(1, 2, None),
                new_value(2, 1, Some(3.0)),
            ])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let mut fetched = store.fetch_values(7, &[1], &[1, 2]).await.unwrap();
        fetched.sort_by_key(|v| v.key);
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].feature_value, Some(1.5));
        assert_eq!(fetched[1].feature_value, None);

        assert!(store.fetch_values(8, &[1, 2], &[1, 2]).await.unwrap().is_empty());
        assert!(store.fetch_values(7, &[], &[1]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_value_key_is_constraint() {
        let store = memory_store().await;
        store.insert_features(&["x".to_string()]).await.unwrap();
        store.insert_values(&[new_value(1, 1, Some(1.0))]).await.unwrap();

        let err = store
            .insert_values(&[new_value(1, 1, Some(2.0))])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));
    }

    #[tokio::test]
    async fn test_update_by_record_id() {
        let store = memory_store().await;
        store.insert_features(&["x".to_string()]).await.unwrap();
        store.insert_values(&[new_value(1, 1, Some(1.0))]).await.unwrap();
        let stored = store.fetch_values(7, &[1], &[1]).await.unwrap();

        let written = store
            .update_values(&[FeatureValueUpdate {
                record_id: stored[0].record_id,
                feature_value: Some(9.0),
                extractor_version: "v2".to_string(),
            }])
            .await
            .unwrap();
        assert_eq!(written, 1);

        let stored = store.fetch_values(7, &[1], &[1]).await.unwrap();
        assert_eq!(stored[0].feature_value, Some(9.0));
        assert_eq!(stored[0].extractor_version, "v2");
    }

    #[tokio::test]
    async fn test_large_insert_spans_statements() {
        let store = memory_store().await;
        store.insert_features(&["x".to_string()]).await.unwrap();
        let rows: Vec<_> = (0..2500).map(|c| new_value(c, 1, Some(c as f64))).collect();
        assert_eq!(store.insert_values(&rows).await.unwrap(), 2500);
    }

    #[tokio::test]
    async fn test_cycle_dates_upserted() {
        let store = memory_store().await;
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let cycle = |cycle_id, d| CycleRecord {
            station_id: 7,
            cycle_id,
            cycle_date: day(d),
        };

        assert_eq!(
            store.upsert_cycles(&[cycle(2, 20), cycle(1, 20)]).await.unwrap(),
            2
        );
        store.upsert_cycles(&[cycle(1, 21)]).await.unwrap();

        let fetched = store.fetch_cycles(7, &[1, 2, 3]).await.unwrap();
        assert_eq!(fetched, vec![cycle(1, 21), cycle(2, 20)]);
        assert!(store.fetch_cycles(8, &[1, 2]).await.unwrap().is_empty());
        assert!(store.fetch_cycles(7, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_requires_existing_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("features.db");
        let url = format!("sqlite://{}", path.display());

        assert!(SqliteStore::connect(&url, RetryPolicy::none()).await.is_err());
        assert!(!path.exists());

        let store = SqliteStore::connect_or_create(&url, RetryPolicy::none())
            .await
            .unwrap();
        store.create_schema().await.unwrap();
        drop(store);
        assert!(path.exists());
        SqliteStore::connect(&url, RetryPolicy::none()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stations_ordered() {
        let store = memory_store().await;
        let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        for (id, name) in [(9, "north"), (3, "south")] {
            store
                .add_station(&StationProfile {
                    station_id: id,
                    name: name.to_string(),
                    created_at,
                })
                .await
                .unwrap();
        }

        let stations = store.stations().await.unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].station_id, 3);
        assert_eq!(stations[1].created_at, created_at);
    }
}
