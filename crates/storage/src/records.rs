//! Persisted Record Types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Feature catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    pub feature_id: i64,
    pub feature_name: String,
}

/// Unique key of an extracted feature value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureValueKey {
    pub cycle_id: i64,
    pub feature_id: i64,
    pub station_id: i64,
}

/// Extracted feature value as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFeatureValue {
    /// Surrogate id
    pub record_id: i64,
    pub key: FeatureValueKey,
    /// `None` is the missing-value sentinel (SQL `NULL`)
    pub feature_value: Option<f64>,
    pub extractor_version: String,
}

/// Row to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeatureValue {
    pub key: FeatureValueKey,
    pub feature_value: Option<f64>,
    pub extractor_version: String,
}

/// Row to update, addressed by surrogate id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValueUpdate {
    pub record_id: i64,
    pub feature_value: Option<f64>,
    pub extractor_version: String,
}

/// Station profile used to enumerate units of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationProfile {
    pub station_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Date directory a cycle was last synced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleRecord {
    pub station_id: i64,
    pub cycle_id: i64,
    pub cycle_date: NaiveDate,
}
