use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UsageError};
use crate::time_utils::{day_start_utc, next_day_start_utc};

/// Name of the column every uploaded file must carry.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

// ── Event ─────────────────────────────────────────────────────────────────────

/// A single row of the uploaded event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Normalised UTC timestamp parsed from the `timestamp` column.
    pub timestamp: DateTime<Utc>,
    /// Every column of the row as read, in header order.
    pub fields: Vec<String>,
}

impl Event {
    /// Calendar date of the event in UTC.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// The parsed contents of one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    /// Header names in file order.
    pub columns: Vec<String>,
    /// Index of the `timestamp` column within `columns`.
    pub timestamp_column: usize,
    /// Rows with a valid timestamp, in file order.
    pub events: Vec<Event>,
    /// Data rows read, header excluded.
    pub rows_read: usize,
    /// Rows dropped because their timestamp did not parse.
    pub rows_rejected: usize,
}

impl EventLog {
    /// Look up a passthrough field of `event` by column name.
    pub fn field<'a>(&self, event: &'a Event, column: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        event.fields.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ── Granularity ───────────────────────────────────────────────────────────────

/// First day of a calendar week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl WeekStart {
    fn days_since_start(self, date: NaiveDate) -> u32 {
        match self {
            WeekStart::Monday => date.weekday().num_days_from_monday(),
            WeekStart::Sunday => date.weekday().num_days_from_sunday(),
        }
    }
}

impl fmt::Display for WeekStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekStart::Monday => write!(f, "monday"),
            WeekStart::Sunday => write!(f, "sunday"),
        }
    }
}

impl FromStr for WeekStart {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "monday" | "mon" => Ok(WeekStart::Monday),
            "sunday" | "sun" => Ok(WeekStart::Sunday),
            other => Err(UsageError::Config(format!(
                "invalid week start \"{}\" (expected monday or sunday)",
                other
            ))),
        }
    }
}

/// Calendar unit events are counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Every supported unit, in selector order.
    pub const ALL: [Granularity; 3] = [Granularity::Day, Granularity::Week, Granularity::Month];

    /// The period start (bucket key) containing `date`.
    ///
    /// Applying this to its own output returns the same key.
    pub fn bucket_of(self, date: NaiveDate, week_start: WeekStart) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                let back = u64::from(week_start.days_since_start(date));
                date.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// The bucket key following `bucket`, or `None` past the calendar's end.
    ///
    /// `bucket` must already be a period start for this granularity.
    pub fn next_bucket(self, bucket: NaiveDate) -> Option<NaiveDate> {
        match self {
            Granularity::Day => bucket.succ_opt(),
            Granularity::Week => bucket.checked_add_days(Days::new(7)),
            Granularity::Month => bucket.checked_add_months(Months::new(1)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            _ => Err(UsageError::InvalidGranularity(s.to_string())),
        }
    }
}

/// How events are assigned to buckets beyond the granularity itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPolicy {
    pub week_start: WeekStart,
    /// Emit zero-count buckets between the first and last observed bucket.
    pub fill_gaps: bool,
}

// ── DateRange ─────────────────────────────────────────────────────────────────

/// Inclusive range of calendar dates, validated so that `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = UsageError;

    fn try_from(raw: RawDateRange) -> Result<Self> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(UsageError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// `true` when `ts` falls on or after `start` 00:00 UTC and before the
    /// midnight that ends `end`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= day_start_utc(self.start) && ts < next_day_start_utc(self.end)
    }
}

// ── AggregatedSeries ──────────────────────────────────────────────────────────

/// One bucket of an [`AggregatedSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Period start date.
    pub period: NaiveDate,
    pub count: u64,
}

/// Bucket counts sorted ascending by period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    pub granularity: Granularity,
    pub points: Vec<SeriesPoint>,
}

impl AggregatedSeries {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter()
    }

    /// Number of events counted across every bucket.
    pub fn total(&self) -> u64 {
        self.points.iter().map(|p| p.count).sum()
    }

    /// Highest bucket; ties resolve to the earliest period.
    pub fn peak(&self) -> Option<SeriesPoint> {
        self.points
            .iter()
            .copied()
            .reduce(|best, p| if p.count > best.count { p } else { best })
    }

    /// Mean count per bucket, `0.0` for an empty series.
    pub fn mean(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.total() as f64 / self.points.len() as f64
    }

    /// Number of buckets whose count is strictly above `threshold`.
    pub fn buckets_above(&self, threshold: f64) -> usize {
        self.points
            .iter()
            .filter(|p| p.count as f64 > threshold)
            .count()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
