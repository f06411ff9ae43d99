//! Backfill Progress Ledger

use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One unit of work: a station's data for one date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub station_id: i64,
    pub date: NaiveDate,
}

impl UnitKey {
    pub fn new(station_id: i64, date: NaiveDate) -> Self {
        Self { station_id, date }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.station_id, self.date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerRecord {
    completed: Vec<String>,
    last_updated: Option<DateTime<Utc>>,
}

/// Durable record of completed units, rewritten in full on every update
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    record: LedgerRecord,
    index: HashSet<String>,
}

impl ProgressLedger {
    /// Load the ledger at `path`. A missing or unreadable file yields an
    /// empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let record = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<LedgerRecord>(&contents) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Corrupt progress ledger {}, starting empty: {}", path.display(), e);
                    LedgerRecord::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No progress ledger at {}", path.display());
                LedgerRecord::default()
            }
            Err(e) => {
                warn!("Failed to read progress ledger {}, starting empty: {}", path.display(), e);
                LedgerRecord::default()
            }
        };

        let index = record.completed.iter().cloned().collect();
        info!(
            "Progress ledger {} holds {} completed units",
            path.display(),
            record.completed.len()
        );
        Self {
            path,
            record,
            index,
        }
    }

    /// Ledger file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if `key` was completed by an earlier run
    pub fn is_already_processed(&self, key: &UnitKey) -> bool {
        self.index.contains(&key.to_string())
    }

    /// Record `key` as completed and persist the ledger immediately
    pub fn mark_completed(&mut self, key: &UnitKey) -> Result<(), LedgerError> {
        let entry = key.to_string();
        if self.index.insert(entry.clone()) {
            self.record.completed.push(entry);
        }
        self.record.last_updated = Some(Utc::now());
        self.persist()?;
        debug!("Marked unit {} completed", key);
        Ok(())
    }

    /// Completed unit keys, in completion order
    pub fn completed(&self) -> &[String] {
        &self.record.completed
    }

    /// Time of the last update, if any
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.record.last_updated
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(&self.record)?;
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}
