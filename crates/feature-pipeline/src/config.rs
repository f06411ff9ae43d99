//! Pipeline Configuration

use crate::PipelineError;
use feature_engine::ChannelLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storage::RetryPolicy;

/// Environment variable prefix, e.g. `PIPELINE_BATCH_SIZE`,
/// `PIPELINE_RETRY__MAX_ATTEMPTS`
pub const ENV_PREFIX: &str = "PIPELINE";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    /// Write daily `<date>.log` and `<date>.error.log` files here
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tag stamped on every written feature value
    pub extractor_version: String,
    /// Root of `<station_id>/<YYYY-MM-DD>/*.bin`
    pub data_root: PathBuf,
    /// Use the test database and bootstrap its schema
    pub test_mode: bool,
    pub database_url: String,
    pub test_database_url: String,
    /// Feature values per synchronizer batch
    pub batch_size: usize,
    pub ledger_path: PathBuf,
    pub pressure_channels: Vec<String>,
    pub temperature_channels: Vec<String>,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let layout = ChannelLayout::default();
        Self {
            extractor_version: "1.0.0".to_string(),
            data_root: PathBuf::from("data"),
            test_mode: false,
            database_url: "sqlite://features.db".to_string(),
            test_database_url: "sqlite://features_test.db".to_string(),
            batch_size: 1000,
            ledger_path: PathBuf::from("progress.json"),
            pressure_channels: layout.pressure().to_vec(),
            temperature_channels: layout.temperature().to_vec(),
            retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration.
    ///
    /// Layers, lowest first: the TOML file (`path`, or an optional
    /// `pipeline.toml` in the working directory), then `PIPELINE_*`
    /// environment variables. Keys set by neither keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("pipeline").required(false),
        };

        let config: PipelineConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("pressure_channels")
                    .with_list_parse_key("temperature_channels")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.extractor_version.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "extractor_version must not be empty".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        if self.pressure_channels.is_empty() && self.temperature_channels.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one pressure or temperature channel is required".into(),
            ));
        }
        self.channel_layout()?;
        Ok(())
    }

    /// Channel layout built from the configured channel lists
    pub fn channel_layout(&self) -> Result<ChannelLayout, PipelineError> {
        Ok(ChannelLayout::new(
            self.pressure_channels.clone(),
            self.temperature_channels.clone(),
        )?)
    }

    /// Database selected by the run mode
    pub fn active_database_url(&self) -> &str {
        if self.test_mode {
            &self.test_database_url
        } else {
            &self.database_url
        }
    }
}
