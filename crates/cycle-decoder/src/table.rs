//! Cycle Table and Builder

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// One measurement run: channel name to samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Cycle identifier, unique within a unit
    pub cycle_id: i64,
    /// Samples per channel; channels may differ in length
    pub channels: BTreeMap<String, Vec<f32>>,
}

impl Cycle {
    /// Samples of a channel, if the cycle has it
    pub fn channel(&self, name: &str) -> Option<&[f32]> {
        self.channels.get(name).map(Vec::as_slice)
    }
}

/// Immutable, `cycle_id`-ordered collection of cycles for one unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleTable {
    cycles: Vec<Cycle>,
}

impl CycleTable {
    /// Cycles in ascending `cycle_id` order
    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    /// Look up a cycle by id
    pub fn get(&self, cycle_id: i64) -> Option<&Cycle> {
        self.cycles
            .binary_search_by_key(&cycle_id, |c| c.cycle_id)
            .ok()
            .map(|idx| &self.cycles[idx])
    }

    /// Number of cycles
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    /// True when no cycle was decoded
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// Mutable accumulator used while files are being decoded
#[derive(Debug, Default)]
pub struct CycleTableBuilder {
    cycles: BTreeMap<i64, BTreeMap<String, Vec<f32>>>,
}

impl CycleTableBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Store samples for `(cycle_id, channel)`. A repeated pair replaces the
    /// earlier samples.
    pub fn insert(&mut self, cycle_id: i64, channel: impl Into<String>, samples: Vec<f32>) {
        let channel = channel.into();
        let channels = self.cycles.entry(cycle_id).or_default();
        if channels.contains_key(&channel) {
            warn!(cycle_id, channel = %channel, "Duplicate channel for cycle, keeping latest file");
        }
        channels.insert(channel, samples);
    }

    /// Number of distinct cycles seen so far
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    /// True when nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Freeze into an ordered table
    pub fn build(self) -> CycleTable {
        let cycles = self
            .cycles
            .into_iter()
            .map(|(cycle_id, channels)| Cycle { cycle_id, channels })
            .collect();
        CycleTable { cycles }
    }
}
