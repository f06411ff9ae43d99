//! Sensor File Name Parsing

use crate::error::DecodeError;

/// Extension of raw sensor payload files
pub const BIN_EXTENSION: &str = "bin";

/// Identity of a sensor file, parsed from its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFileName {
    /// Cycle the samples belong to
    pub cycle_id: i64,
    /// Channel name (e.g. `Pressure1`)
    pub channel: String,
}

impl SensorFileName {
    /// Parse `<prefix>_<cycle_id> <description>_<Channel>.bin`.
    ///
    /// The name is split at the first space. The cycle id is the second
    /// `_` token of the left half; the channel is the last `_` token of the
    /// right half with the extension removed.
    pub fn parse(file_name: &str) -> Result<Self, DecodeError> {
        let malformed = || DecodeError::MalformedFileName(file_name.to_string());

        let (base, rest) = file_name.split_once(' ').ok_or_else(malformed)?;

        let token = base.split('_').nth(1).ok_or_else(malformed)?;
        let cycle_id = token
            .trim()
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidCycleId {
                file_name: file_name.to_string(),
                token: token.to_string(),
            })?;

        let (_, channel_part) = rest.rsplit_once('_').ok_or_else(malformed)?;
        let channel = channel_part.split('.').next().unwrap_or_default();
        if channel.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            cycle_id,
            channel: channel.to_string(),
        })
    }
}
