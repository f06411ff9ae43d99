//! Directory Decoder

use crate::error::DecodeError;
use crate::filename::{SensorFileName, BIN_EXTENSION};
use crate::table::{CycleTable, CycleTableBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Size of one encoded sample
pub const SAMPLE_BYTES: usize = 4;

/// Decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Channel names accepted from file names
    pub channels: BTreeSet<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        let channels = (1..=4)
            .flat_map(|i| [format!("Pressure{i}"), format!("Temp{i}")])
            .collect();
        Self { channels }
    }
}

impl DecoderConfig {
    /// Accept exactly the given channel names
    pub fn with_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of decoding one unit directory
#[derive(Debug, Default)]
pub struct DecodedUnit {
    /// Cycles decoded from the valid files
    pub table: CycleTable,
    /// Number of files that decoded successfully
    pub decoded_files: usize,
    /// Per-file failures that were skipped
    pub failures: Vec<DecodeError>,
}

/// Unpack a raw little-endian f32 payload
pub fn decode_samples(path: &Path, bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() % SAMPLE_BYTES != 0 {
        return Err(DecodeError::TruncatedPayload {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Decoder that turns a directory of `*.bin` files into a [`CycleTable`]
pub struct CycleDecoder {
    config: DecoderConfig,
}

impl CycleDecoder {
    /// Create a decoder with the given config
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Decode every `*.bin` file below `dir`.
    ///
    /// Bad files are logged and collected in [`DecodedUnit::failures`]; they
    /// never stop the walk. A missing directory yields an empty table.
    pub fn decode_dir(&self, dir: &Path) -> DecodedUnit {
        if !dir.is_dir() {
            warn!("Unit directory {} does not exist", dir.display());
            return DecodedUnit::default();
        }

        let mut builder = CycleTableBuilder::new();
        let mut decoded_files = 0;
        let mut failures = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(dir).to_path_buf();
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    let err = DecodeError::Io { path, source };
                    warn!("Skipping unreadable entry: {}", err);
                    failures.push(err);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(BIN_EXTENSION)
            {
                continue;
            }

            match self.decode_file(path) {
                Ok((name, samples)) => {
                    debug!(
                        cycle_id = name.cycle_id,
                        channel = %name.channel,
                        samples = samples.len(),
                        "Decoded {}",
                        path.display()
                    );
                    builder.insert(name.cycle_id, name.channel, samples);
                    decoded_files += 1;
                }
                Err(err) => {
                    warn!("Error processing file {}: {}", path.display(), err);
                    failures.push(err);
                }
            }
        }

        let table = builder.build();
        info!(
            "Decoded {} cycles from {} files in {} ({} skipped)",
            table.len(),
            decoded_files,
            dir.display(),
            failures.len()
        );

        DecodedUnit {
            table,
            decoded_files,
            failures,
        }
    }

    /// Parse the file name and payload of one sensor file
    pub fn decode_file(&self, path: &Path) -> Result<(SensorFileName, Vec<f32>), DecodeError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let name = SensorFileName::parse(&file_name)?;
        if !self.config.channels.contains(&name.channel) {
            return Err(DecodeError::UnknownChannel {
                file_name,
                channel: name.channel,
            });
        }

        let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let samples = decode_samples(path, &bytes)?;

        Ok((name, samples))
    }
}

impl Default for CycleDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}
