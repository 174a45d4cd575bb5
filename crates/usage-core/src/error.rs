use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// All errors produced by the usage report pipeline.
///
/// Every variant renders a message suitable for showing to the person who
/// supplied the input; the shell surfaces them verbatim.
#[derive(Error, Debug)]
pub enum UsageError {
    /// The uploaded bytes are not valid UTF-8 text.
    #[error("Input is not valid UTF-8 text (invalid byte at offset {offset})")]
    Encoding { offset: usize },

    /// The mandatory `timestamp` column is absent from the header row.
    #[error("Missing required column \"{column}\" (found: {found})")]
    Schema { column: String, found: String },

    /// The `timestamp` column exists but not a single row could be parsed.
    #[error("No valid timestamps found in {rows_read} data rows")]
    NoValidTimestamps { rows_read: usize },

    /// The requested start date lies after the end date.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// The bucketing unit is not one of `day`, `week` or `month`.
    #[error("Invalid granularity \"{0}\" (expected day, week or month)")]
    InvalidGranularity(String),

    /// A date bound could not be parsed as a calendar date.
    #[error("Invalid date \"{0}\" (expected YYYY-MM-DD)")]
    InvalidDate(String),

    /// The y-axis hint has its minimum above its maximum.
    #[error("Invalid y-axis range: min {min} is above max {max}")]
    InvalidAxisRange { min: u64, max: u64 },

    /// The upload exceeds the configured byte limit.
    #[error("Input is {size} bytes, above the {limit} byte limit")]
    InputTooLarge { size: u64, limit: u64 },

    /// A file could not be opened, read or written.
    #[error("Failed to access file {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The delimited text is structurally malformed.
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for raw I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the usage crates.
pub type Result<T> = std::result::Result<T, UsageError>;
