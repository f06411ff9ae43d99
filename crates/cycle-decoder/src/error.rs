//! Decode Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors while decoding a single sensor file.
///
/// All variants are local to one file: the decoder logs them and moves on.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// File name does not follow `<prefix>_<cycle_id> <description>_<Channel>.bin`
    #[error("Malformed file name: {0}")]
    MalformedFileName(String),

    /// Cycle token is not an integer
    #[error("Invalid cycle id '{token}' in file name {file_name}")]
    InvalidCycleId { file_name: String, token: String },

    /// Channel token is not one of the recognized channels
    #[error("Unrecognized channel '{channel}' in file name {file_name}")]
    UnknownChannel { file_name: String, channel: String },

    /// Payload length is not a whole number of f32 samples
    #[error("Truncated payload in {}: {len} bytes is not a multiple of 4", path.display())]
    TruncatedPayload { path: PathBuf, len: usize },

    /// Filesystem error while reading the file or walking the directory
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
