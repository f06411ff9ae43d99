//! Feature Engine Error Types

use thiserror::Error;

/// Failure inside a single feature function
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    /// An index derived from one series does not fit another
    #[error("index {index} out of range for {series} of length {len}")]
    IndexOutOfRange {
        series: &'static str,
        index: usize,
        len: usize,
    },
}

/// Errors raised by [`crate::FeatureExtractor`]
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Channel appears more than once across the pressure/temperature lists
    #[error("Channel {0} is listed more than once in the channel layout")]
    OverlappingChannels(String),

    /// A named feature failed; fatal for the whole extraction
    #[error("Failed to compute {column} for cycle {cycle_id}: {source}")]
    FeatureComputation {
        column: String,
        cycle_id: i64,
        #[source]
        source: ComputeError,
    },
}
