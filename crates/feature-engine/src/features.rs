//! Feature Table Assembly

use crate::catalog::{FeatureDef, FeatureGroup, CATALOG};
use crate::error::ExtractionError;
use crate::signal::Signal;
use cycle_decoder::CycleTable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info};

/// Pressure and temperature channel names, disjoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pressure: Vec<String>,
    temperature: Vec<String>,
}

impl ChannelLayout {
    /// Validate and build a layout. A channel may appear only once.
    pub fn new(pressure: Vec<String>, temperature: Vec<String>) -> Result<Self, ExtractionError> {
        let mut seen = HashSet::new();
        for channel in pressure.iter().chain(&temperature) {
            if !seen.insert(channel.as_str()) {
                return Err(ExtractionError::OverlappingChannels(channel.clone()));
            }
        }
        Ok(Self {
            pressure,
            temperature,
        })
    }

    /// Pressure channels
    pub fn pressure(&self) -> &[String] {
        &self.pressure
    }

    /// Temperature channels
    pub fn temperature(&self) -> &[String] {
        &self.temperature
    }

    /// All channels, pressure first
    pub fn channels(&self) -> impl Iterator<Item = &String> {
        self.pressure.iter().chain(&self.temperature)
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            pressure: (1..=4).map(|i| format!("Pressure{i}")).collect(),
            temperature: (1..=4).map(|i| format!("Temp{i}")).collect(),
        }
    }
}

/// One row of the feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub cycle_id: i64,
    /// One cell per table column; `None` is missing
    pub values: Vec<Option<f64>>,
}

/// Per-cycle scalar features, columns named `{channel}_{feature}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Assemble a table. Each row must carry one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        debug_assert!(rows.iter().all(|r| r.values.len() == columns.len()));
        Self { columns, rows }
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in cycle order
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Row for a cycle
    pub fn row(&self, cycle_id: i64) -> Option<&FeatureRow> {
        self.rows.iter().find(|r| r.cycle_id == cycle_id)
    }

    /// Cell value; `None` if missing or if the cycle/column is unknown
    pub fn value(&self, cycle_id: i64, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.row(cycle_id)?.values[idx]
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of cells (rows × columns)
    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }
}

struct PlannedColumn {
    channel: String,
    feature: &'static FeatureDef,
    column: String,
}

/// Applies the feature catalog to every channel of every cycle
pub struct FeatureExtractor {
    layout: ChannelLayout,
    plan: Vec<PlannedColumn>,
}

impl FeatureExtractor {
    /// Create an extractor for the given channel layout
    pub fn new(layout: ChannelLayout) -> Self {
        Self::with_catalog(layout, CATALOG)
    }

    /// Create an extractor over a custom feature catalog
    pub fn with_catalog(layout: ChannelLayout, catalog: &'static [FeatureDef]) -> Self {
        let mut plan = Vec::new();
        let mut add = |group: FeatureGroup, channels: &[String]| {
            for feature in catalog.iter().filter(|f| f.group == group) {
                for channel in channels {
                    plan.push(PlannedColumn {
                        channel: channel.clone(),
                        feature,
                        column: format!("{}_{}", channel, feature.name),
                    });
                }
            }
        };

        add(FeatureGroup::Pressure, &layout.pressure);
        add(FeatureGroup::Temperature, &layout.temperature);
        let all: Vec<String> = layout.channels().cloned().collect();
        add(FeatureGroup::Common, &all);

        Self { layout, plan }
    }

    /// Channel layout in use
    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    /// Output column names, in order
    pub fn columns(&self) -> Vec<String> {
        self.plan.iter().map(|p| p.column.clone()).collect()
    }

    /// Compute the feature table for a unit.
    ///
    /// A channel absent from a cycle leaves its cells missing, as does any
    /// NaN or infinite result. The first failing feature aborts the
    /// extraction.
    pub fn extract(&self, table: &CycleTable) -> Result<FeatureTable, ExtractionError> {
        info!(
            "Extracting {} features for {} cycles",
            self.plan.len(),
            table.len()
        );
        debug!(
            pressure = ?self.layout.pressure,
            temperature = ?self.layout.temperature,
            "Channel layout"
        );

        let mut rows = Vec::with_capacity(table.len());
        for cycle in table.cycles() {
            let signals: HashMap<&str, Signal> = self
                .layout
                .channels()
                .filter_map(|ch| cycle.channel(ch).map(|s| (ch.as_str(), Signal::from_f32(s))))
                .collect();

            let mut values = vec![None; self.plan.len()];
            for (slot, planned) in values.iter_mut().zip(&self.plan) {
                let Some(signal) = signals.get(planned.channel.as_str()) else {
                    continue;
                };
                let value = (planned.feature.compute)(signal).map_err(|source| {
                    error!(
                        "Error computing feature {} for cycle {}: {}",
                        planned.column, cycle.cycle_id, source
                    );
                    ExtractionError::FeatureComputation {
                        column: planned.column.clone(),
                        cycle_id: cycle.cycle_id,
                        source,
                    }
                })?;
                *slot = value.filter(|v| v.is_finite());
            }

            rows.push(FeatureRow {
                cycle_id: cycle.cycle_id,
                values,
            });
        }

        info!("Extracted {} feature columns", self.plan.len());
        Ok(FeatureTable::new(self.columns(), rows))
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ChannelLayout::default())
    }
}
