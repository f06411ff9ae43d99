//! Cycle Feature Pipeline
//!
//! Walks `<data_root>/<station_id>/<date>` units, decodes their sensor
//! files, extracts per-cycle features and syncs them into the feature store,
//! recording finished units in the progress ledger.

pub mod config;

pub use config::{LoggingConfig, PipelineConfig};

use chrono::NaiveDate;
use cycle_decoder::{CycleDecoder, DecoderConfig};
use feature_engine::{ExtractionError, FeatureExtractor, FeatureTable};
use feature_sync::{
    FeatureRegistry, FeatureSynchronizer, LedgerError, ProgressLedger, RegistryError, SyncError,
    SyncReport, UnitKey,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{CycleRecord, FeatureStore, StorageError};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Dispatch, Instrument};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};
use walkdir::WalkDir;

/// Date directory format
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to open log files in {}: {source}", path.display())]
    LogFiles {
        path: PathBuf,
        #[source]
        source: InitError,
    },

    #[error("Station {0} has no profile")]
    UnknownStation(i64),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build the subscriber described by `config`.
///
/// The caller decides how to install it, e.g. with
/// `tracing::dispatcher::set_default`. `RUST_LOG` overrides the configured
/// level. With `config.directory` set, INFO and above also go to a daily
/// `<date>.log` file and ERROR to `<date>.error.log`.
pub fn init_logging(config: &LoggingConfig) -> Result<Dispatch, PipelineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if config.json {
        layers.push(fmt::layer().json().with_target(true).boxed());
    } else {
        layers.push(fmt::layer().with_target(true).boxed());
    }

    if let Some(ref dir) = config.directory {
        std::fs::create_dir_all(dir).map_err(|source| PipelineError::Io {
            path: dir.clone(),
            source,
        })?;
        let daily = |suffix: &str| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_suffix(suffix)
                .build(dir)
                .map_err(|source| PipelineError::LogFiles {
                    path: dir.clone(),
                    source,
                })
        };
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(daily("log")?)
                .with_filter(LevelFilter::INFO)
                .boxed(),
        );
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(daily("error.log")?)
                .with_filter(LevelFilter::ERROR)
                .boxed(),
        );
    }

    Ok(Dispatch::new(Registry::default().with(layers).with(filter)))
}

/// Which units a run covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Only this date; every date directory otherwise
    pub date: Option<NaiveDate>,
    /// Only this station; every profiled station otherwise
    pub station: Option<i64>,
    /// Reprocess units the ledger marks as completed
    pub force: bool,
}

/// Result of one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Features synced and the unit marked completed
    Synced(SyncReport),
    /// No cycles decoded; the unit is not marked
    Empty,
    /// Completed by an earlier run
    AlreadyProcessed,
}

/// Totals of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped_complete: usize,
    pub empty_units: usize,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_skipped: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::Synced(report) => {
                self.processed += 1;
                self.rows_inserted += report.inserted;
                self.rows_updated += report.updated;
                self.rows_skipped += report.skipped;
            }
            UnitOutcome::Empty => self.empty_units += 1,
            UnitOutcome::AlreadyProcessed => self.skipped_complete += 1,
        }
    }
}

/// Orchestrates decoding, extraction and synchronization unit by unit
pub struct Pipeline<S: FeatureStore + ?Sized> {
    config: PipelineConfig,
    store: Arc<S>,
    decoder: CycleDecoder,
    extractor: FeatureExtractor,
    registry: FeatureRegistry<S>,
    synchronizer: FeatureSynchronizer<S>,
    ledger: ProgressLedger,
}

impl<S: FeatureStore + ?Sized> Pipeline<S> {
    /// Build a pipeline over `store`, loading the ledger from
    /// `config.ledger_path`
    pub fn new(config: PipelineConfig, store: Arc<S>) -> Result<Self, PipelineError> {
        config.validate()?;
        let layout = config.channel_layout()?;
        let decoder = CycleDecoder::new(DecoderConfig::with_channels(layout.channels().cloned()));
        let ledger = ProgressLedger::load(&config.ledger_path);

        Ok(Self {
            decoder,
            extractor: FeatureExtractor::new(layout),
            registry: FeatureRegistry::new(store.clone()),
            synchronizer: FeatureSynchronizer::new(store.clone()),
            ledger,
            store,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Progress ledger
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Directory holding one unit's sensor files
    pub fn unit_dir(&self, key: &UnitKey) -> PathBuf {
        self.config
            .data_root
            .join(key.station_id.to_string())
            .join(key.date.format(DATE_FORMAT).to_string())
    }

    /// Units covered by `options`, ordered by station then date
    pub async fn units(&self, options: &RunOptions) -> Result<Vec<UnitKey>, PipelineError> {
        let stations = self.store.stations().await?;
        let station_ids: Vec<i64> = match options.station {
            Some(id) if stations.iter().any(|s| s.station_id == id) => vec![id],
            Some(id) => return Err(PipelineError::UnknownStation(id)),
            None => stations.iter().map(|s| s.station_id).collect(),
        };

        let mut units = Vec::new();
        for station_id in station_ids {
            match options.date {
                Some(date) => units.push(UnitKey::new(station_id, date)),
                None => {
                    let station_dir = self.config.data_root.join(station_id.to_string());
                    units.extend(
                        list_dates(&station_dir)?
                            .into_iter()
                            .map(|date| UnitKey::new(station_id, date)),
                    );
                }
            }
        }
        units.sort();
        Ok(units)
    }

    /// Process every unit covered by `options`, stopping at the first failure
    pub async fn run(&mut self, options: &RunOptions) -> Result<RunSummary, PipelineError> {
        let units = self.units(options).await?;
        info!(
            "Processing {} units (extractor version {})",
            units.len(),
            self.config.extractor_version
        );

        let mut summary = RunSummary::default();
        for key in &units {
            let span = info_span!("unit", station_id = key.station_id, date = %key.date);
            match self.process_unit(key, options.force).instrument(span).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    error!("Unit {} failed: {}", key, e);
                    return Err(e);
                }
            }
        }

        info!(
            processed = summary.processed,
            skipped_complete = summary.skipped_complete,
            empty_units = summary.empty_units,
            rows_inserted = summary.rows_inserted,
            rows_updated = summary.rows_updated,
            rows_skipped = summary.rows_skipped,
            "Run complete"
        );
        Ok(summary)
    }

    /// Decode, extract and sync one unit, then mark it completed
    pub async fn process_unit(
        &mut self,
        key: &UnitKey,
        force: bool,
    ) -> Result<UnitOutcome, PipelineError> {
        if !force && self.ledger.is_already_processed(key) {
            debug!("Unit {} already processed, skipping", key);
            return Ok(UnitOutcome::AlreadyProcessed);
        }

        let dir = self.unit_dir(key);
        info!("Processing unit {} from {}", key, dir.display());

        let decoded = self.decoder.decode_dir(&dir);
        if decoded.table.is_empty() {
            warn!("No cycles found for unit {}, skipping", key);
            return Ok(UnitOutcome::Empty);
        }

        let features = self.extractor.extract(&decoded.table)?;
        self.record_cycles(key, &features).await?;
        let feature_ids = self.registry.resolve(features.columns()).await?;
        let report = self
            .synchronizer
            .sync(
                &features,
                &feature_ids,
                key.station_id,
                &self.config.extractor_version,
                self.config.batch_size,
            )
            .await?;

        self.ledger.mark_completed(key)?;
        info!(
            "Unit {} done: {} cycles, {} inserted, {} updated, {} skipped",
            key,
            features.len(),
            report.inserted,
            report.updated,
            report.skipped
        );
        Ok(UnitOutcome::Synced(report))
    }

    /// Record `key.date` as the source date of every cycle in `features`.
    /// A cycle id already recorded under another date is reassigned, and its
    /// stored values will be overwritten by this unit.
    async fn record_cycles(
        &self,
        key: &UnitKey,
        features: &FeatureTable,
    ) -> Result<(), PipelineError> {
        let cycle_ids: Vec<i64> = features.rows().iter().map(|r| r.cycle_id).collect();

        for previous in self.store.fetch_cycles(key.station_id, &cycle_ids).await? {
            if previous.cycle_date != key.date {
                warn!(
                    "Cycle {} of station {} was recorded under {}, reassigning to {}",
                    previous.cycle_id, key.station_id, previous.cycle_date, key.date
                );
            }
        }

        let rows: Vec<CycleRecord> = cycle_ids
            .iter()
            .map(|&cycle_id| CycleRecord {
                station_id: key.station_id,
                cycle_id,
                cycle_date: key.date,
            })
            .collect();
        self.store.upsert_cycles(&rows).await?;
        Ok(())
    }
}

/// Date directories directly below `station_dir`, ascending. Entries that
/// are not `YYYY-MM-DD` directories are ignored; a missing directory has no
/// dates.
pub fn list_dates(station_dir: &Path) -> Result<Vec<NaiveDate>, PipelineError> {
    if !station_dir.is_dir() {
        warn!("Station directory {} does not exist", station_dir.display());
        return Ok(Vec::new());
    }

    let mut dates = Vec::new();
    for entry in WalkDir::new(station_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| PipelineError::Io {
            path: station_dir.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        match NaiveDate::parse_from_str(&name, DATE_FORMAT) {
            Ok(date) => dates.push(date),
            Err(_) => debug!("Ignoring non-date directory {}", entry.path().display()),
        }
    }
    dates.sort();
    Ok(dates)
}

/// Numeric directories directly below `data_root`, ascending
pub fn discover_stations(data_root: &Path) -> Result<Vec<i64>, PipelineError> {
    if !data_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut stations = Vec::new();
    for entry in WalkDir::new(data_root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| PipelineError::Io {
            path: data_root.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;
        if entry.file_type().is_dir() {
            if let Ok(id) = entry.file_name().to_string_lossy().parse::<i64>() {
                stations.push(id);
            }
        }
    }
    stations.sort_unstable();
    Ok(stations)
}
