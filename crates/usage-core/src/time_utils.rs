use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Result, UsageError};

/// Naive date-time layouts accepted after the offset-carrying forms fail.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Offset-carrying layouts that RFC 3339 parsing rejects (space separator,
/// missing seconds). Offsets are brought to `+hh:mm` form before matching.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

// ── TimestampParser ───────────────────────────────────────────────────────────

/// Parses event timestamps and normalises them to UTC.
///
/// Timestamps carrying an explicit offset (`Z`, `+02:00`, ...) are converted
/// directly. Naive timestamps are interpreted in the parser's default zone,
/// which is UTC unless configured otherwise, and the same rule applies to
/// every row.
#[derive(Debug, Clone, Copy)]
pub struct TimestampParser {
    default_tz: Tz,
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

impl TimestampParser {
    /// Create a parser that reads naive timestamps in `tz_name`.
    ///
    /// Unknown IANA names are a configuration error rather than a silent
    /// fallback, since a wrong zone would shift events between buckets.
    pub fn new(tz_name: &str) -> Result<Self> {
        let default_tz = tz_name
            .trim()
            .parse::<Tz>()
            .map_err(|_| UsageError::Config(format!("unknown timezone \"{}\"", tz_name)))?;
        Ok(Self { default_tz })
    }

    /// Parse an ISO 8601 timestamp into a UTC [`DateTime`].
    ///
    /// Returns `None` for empty strings, unrecognised layouts, and local
    /// times that do not exist in the default zone (DST gaps). Ambiguous
    /// local times resolve to the earlier instant.
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        let normalised = normalise_offset(s);

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&normalised, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }

        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })?;

        self.default_tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Rewrite a trailing ISO 8601 offset into the extended `+hh:mm` form.
///
/// `Z`, `+hh` and `+hhmm` are all valid ISO 8601 offsets. Only the part
/// after the date and its `T` or space separator is inspected, so the
/// dashes of a bare date are never mistaken for an offset.
fn normalise_offset(s: &str) -> String {
    if let Some(stripped) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        return format!("{}+00:00", stripped);
    }

    let Some(time) = s.get(11..) else {
        return s.to_string();
    };
    if !matches!(s.as_bytes().get(10), Some(b'T' | b't' | b' ')) {
        return s.to_string();
    }
    let Some(sign_at) = time.rfind(&['+', '-'][..]) else {
        return s.to_string();
    };

    let (head, offset) = s.split_at(11 + sign_at);
    let digits = &offset[1..];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return s.to_string();
    }
    match digits.len() {
        2 => format!("{}{}:00", head, offset),
        4 => format!("{}{}:{}", head, &offset[..3], &offset[3..]),
        _ => s.to_string(),
    }
}

// ── Date helpers ──────────────────────────────────────────────────────────────

/// Parse a date bound supplied by the shell.
///
/// Accepts `YYYY-MM-DD`, or a date-time whose leading calendar date is
/// taken as-is (date pickers sometimes send `2024-01-01T00:00:00`).
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Ok(date);
    }
    if let Some(head) = s.get(..10) {
        let rest = &s[10..];
        if rest.starts_with('T') || rest.starts_with(' ') {
            if let Ok(date) = NaiveDate::parse_from_str(head, DATE_FORMAT) {
                return Ok(date);
            }
        }
    }
    Err(UsageError::InvalidDate(raw.to_string()))
}

/// Midnight UTC at the start of `date`.
pub fn day_start_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Midnight UTC at the start of the day after `date`.
///
/// Saturates at the last representable date so the exclusive bound stays
/// valid for `NaiveDate::MAX`.
pub fn next_day_start_utc(date: NaiveDate) -> DateTime<Utc> {
    match date.succ_opt() {
        Some(next) => day_start_utc(next),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// Format a date the way every exported artifact renders it.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
