//! CSV ingestion for uploaded event logs.
//!
//! Turns raw upload bytes into an [`EventLog`]: validates the encoding and
//! the header, normalises every `timestamp` to UTC and drops rows whose
//! timestamp does not parse.

use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};
use usage_core::error::{Result, UsageError};
use usage_core::models::{Event, EventLog, TIMESTAMP_COLUMN};
use usage_core::settings::DEFAULT_MAX_INPUT_BYTES;
use usage_core::time_utils::TimestampParser;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ── Options ───────────────────────────────────────────────────────────────────

/// Limits and parsing rules applied to every upload.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Uploads above this many bytes are rejected before decoding.
    pub max_input_bytes: u64,
    /// How `timestamp` values are parsed and normalised.
    pub parser: TimestampParser,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            parser: TimestampParser::default(),
        }
    }
}

impl IngestOptions {
    /// Options reading naive timestamps in `tz_name` with the given limit.
    pub fn new(max_input_bytes: u64, tz_name: &str) -> Result<Self> {
        Ok(Self {
            max_input_bytes,
            parser: TimestampParser::new(tz_name)?,
        })
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse uploaded CSV bytes into an [`EventLog`].
///
/// The first row names the columns and must include `timestamp`. Each later
/// row becomes one [`Event`] carrying every column; rows whose timestamp
/// does not parse are counted in `rows_rejected` and left out.
///
/// # Errors
///
/// * [`UsageError::InputTooLarge`] above `options.max_input_bytes`.
/// * [`UsageError::Encoding`] when the bytes are not UTF-8.
/// * [`UsageError::Schema`] when there is no `timestamp` column.
/// * [`UsageError::Csv`] for structurally broken CSV.
/// * [`UsageError::NoValidTimestamps`] when no row survives.
pub fn parse_events(raw: &[u8], options: &IngestOptions) -> Result<EventLog> {
    check_size(raw.len() as u64, options.max_input_bytes)?;

    let (body, skipped) = match raw.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, UTF8_BOM.len()),
        None => (raw, 0),
    };
    let text = std::str::from_utf8(body).map_err(|e| UsageError::Encoding {
        offset: skipped + e.valid_up_to(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let timestamp_column = find_timestamp_column(&columns)?;

    let mut events: Vec<Event> = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_rejected = 0usize;

    for record in reader.records() {
        let record = record?;
        rows_read += 1;

        // Ragged rows: pad short ones, ignore anything past the header width.
        let fields: Vec<String> = (0..columns.len())
            .map(|i| record.get(i).unwrap_or("").to_string())
            .collect();

        match options.parser.parse(&fields[timestamp_column]) {
            Some(timestamp) => events.push(Event { timestamp, fields }),
            None => {
                rows_rejected += 1;
                debug!(
                    "Row {}: unparseable timestamp \"{}\"",
                    rows_read, fields[timestamp_column]
                );
            }
        }
    }

    if events.is_empty() {
        return Err(UsageError::NoValidTimestamps { rows_read });
    }
    if rows_rejected > 0 {
        warn!(
            "Dropped {} of {} rows with an unparseable timestamp",
            rows_rejected, rows_read
        );
    }

    debug!(
        "Parsed {} events from {} rows ({} columns)",
        events.len(),
        rows_read,
        columns.len()
    );

    Ok(EventLog {
        columns,
        timestamp_column,
        events,
        rows_read,
        rows_rejected,
    })
}

/// Read an upload from disk, enforcing the byte limit before and while
/// reading so a file that grows mid-read cannot exceed it.
pub fn read_input(path: &Path, max_input_bytes: u64) -> Result<Vec<u8>> {
    let file_access = |source: std::io::Error| UsageError::FileAccess {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(file_access)?;
    let size = file.metadata().map_err(file_access)?.len();
    check_size(size, max_input_bytes)?;

    let mut bytes = Vec::with_capacity(size as usize);
    file.take(max_input_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(file_access)?;
    check_size(bytes.len() as u64, max_input_bytes)?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(UsageError::InputTooLarge { size, limit });
    }
    Ok(())
}

fn find_timestamp_column(columns: &[String]) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == TIMESTAMP_COLUMN)
        .ok_or_else(|| UsageError::Schema {
            column: TIMESTAMP_COLUMN.to_string(),
            found: if columns.iter().all(|c| c.is_empty()) {
                "no columns".to_string()
            } else {
                columns.join(", ")
            },
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
