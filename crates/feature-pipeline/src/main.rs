//! Cycle Feature Pipeline - Main Entry Point

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use feature_pipeline::{
    discover_stations, init_logging, Pipeline, PipelineConfig, RunOptions, DATE_FORMAT,
};
use std::path::PathBuf;
use std::sync::Arc;
use storage::{SqliteStore, StationProfile};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "feature-pipeline")]
#[command(version)]
#[command(about = "Extract cycle features from raw sensor files and sync them to the feature store", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./pipeline.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root of <station_id>/<YYYY-MM-DD>/*.bin
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Process a single date; all date directories otherwise
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Process a single station
    #[arg(long)]
    station: Option<i64>,

    /// Extractor version stamped on written values
    #[arg(long)]
    extractor_version: Option<String>,

    /// Use the test database and bootstrap its schema
    #[arg(long)]
    test_mode: bool,

    /// Reprocess units already recorded in the progress ledger
    #[arg(long)]
    force: bool,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn apply_overrides(config: &mut PipelineConfig, cli: &Cli) {
    if let Some(ref data_root) = cli.data_root {
        config.data_root = data_root.clone();
    }
    if let Some(ref version) = cli.extractor_version {
        config.extractor_version = version.clone();
    }
    if cli.test_mode {
        config.test_mode = true;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate().context("Invalid configuration")?;

    let dispatch = init_logging(&config.logging).context("Failed to set up logging")?;
    let _guard = tracing::dispatcher::set_default(&dispatch);

    info!("=== Cycle Feature Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let result = run(config, &cli).await;
    if let Err(ref e) = result {
        error!("Pipeline failed: {:#}", e);
    }
    result
}

async fn run(config: PipelineConfig, cli: &Cli) -> Result<()> {
    let url = config.active_database_url();
    let store = if config.test_mode {
        SqliteStore::connect_or_create(url, config.retry.clone()).await
    } else {
        SqliteStore::connect(url, config.retry.clone()).await
    }
    .with_context(|| format!("Failed to connect to the feature store at {}", url))?;

    if config.test_mode {
        info!("Test mode: using {}", config.test_database_url);
        store
            .create_schema()
            .await
            .context("Failed to create test schema")?;

        for station_id in discover_stations(&config.data_root)? {
            store
                .add_station(&StationProfile {
                    station_id,
                    name: format!("station-{station_id}"),
                    created_at: Utc::now(),
                })
                .await
                .with_context(|| format!("Failed to register station {}", station_id))?;
        }
    }

    let options = RunOptions {
        date: cli.date,
        station: cli.station,
        force: cli.force,
    };

    let mut pipeline = Pipeline::new(config, Arc::new(store))?;
    let summary = pipeline.run(&options).await?;
    info!("Summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}
