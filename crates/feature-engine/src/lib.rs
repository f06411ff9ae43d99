//! Feature Extraction Engine
//!
//! Turns decoded cycle tables into per-cycle scalar feature tables using a
//! fixed catalog of pressure, temperature and common signal features.

mod catalog;
mod error;
mod features;
mod peaks;
mod signal;
mod statistics;

pub use catalog::{features_in, lookup, FeatureDef, FeatureFn, FeatureGroup, FeatureResult, CATALOG};
pub use error::{ComputeError, ExtractionError};
pub use features::{ChannelLayout, FeatureExtractor, FeatureRow, FeatureTable};
pub use peaks::{local_maxima, local_minima};
pub use signal::Signal;
pub use statistics::{gradient, slope_angle, trapezoid, StatisticalFeatures};
