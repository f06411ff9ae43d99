//! Cycle Decoder
//!
//! Reconstructs per-cycle channel time series from a directory of raw
//! `*.bin` sensor files.

mod decoder;
mod error;
mod filename;
mod table;

pub use decoder::{decode_samples, CycleDecoder, DecodedUnit, DecoderConfig, SAMPLE_BYTES};
pub use error::DecodeError;
pub use filename::SensorFileName;
pub use table::{Cycle, CycleTable, CycleTableBuilder};
