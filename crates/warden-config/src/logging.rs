use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported log line formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One human-readable line per event: timestamp, level tag, target, message.
    #[default]
    Compact,
    /// Structured JSON, one object per line. The timestamp, level tag, and
    /// target are carried as the `timestamp`, `level`, and `target` keys
    /// rather than as a text prefix.
    Json,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
