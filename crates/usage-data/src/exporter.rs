//! Delimited-text export of aggregated and detailed results.
//!
//! Every function here is pure: the same input always produces the same
//! bytes. Choosing where the artifact goes, and under which name, is up to
//! the caller; [`suggested_filename`] only proposes one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use usage_core::error::{Result, UsageError};
use usage_core::models::{
    AggregatedSeries, BucketPolicy, DateRange, EventLog, Granularity, SeriesPoint,
};
use usage_core::time_utils::{format_date, parse_date};

use crate::aggregator::UsageAggregator;

/// Media type of every artifact produced here.
pub const CSV_MEDIA_TYPE: &str = "text/csv";

/// Header row of the aggregated export.
pub const SERIES_HEADER: [&str; 2] = ["period", "count"];

/// Column appended to the detailed export holding each event's bucket.
pub const PERIOD_COLUMN: &str = "period";

// ── ExportArtifact ────────────────────────────────────────────────────────────

/// Text content ready to be offered as a download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub content: String,
    pub media_type: String,
}

/// Which of the two exports an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// One row per bucket.
    Aggregated,
    /// One row per event in range, with its bucket.
    Detailed,
}

/// File name offered for an export produced on `date`.
///
/// ```
/// use chrono::NaiveDate;
/// use usage_data::exporter::{suggested_filename, ExportKind};
///
/// let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// assert_eq!(suggested_filename(ExportKind::Aggregated, d), "Usage_Data_2024-03-09.csv");
/// assert_eq!(suggested_filename(ExportKind::Detailed, d), "Usage_Data_Detailed_2024-03-09.csv");
/// ```
pub fn suggested_filename(kind: ExportKind, date: NaiveDate) -> String {
    match kind {
        ExportKind::Aggregated => format!("Usage_Data_{}.csv", format_date(date)),
        ExportKind::Detailed => format!("Usage_Data_Detailed_{}.csv", format_date(date)),
    }
}

// ── Export ────────────────────────────────────────────────────────────────────

/// Serialise `series` as `period,count` rows in series order.
pub fn export_series(series: &AggregatedSeries) -> Result<ExportArtifact> {
    let mut writer = csv_writer();
    writer.write_record(SERIES_HEADER)?;
    for point in series.iter() {
        writer.write_record([format_date(point.period), point.count.to_string()])?;
    }
    finish(writer)
}

/// Serialise the events of `log` inside `range`, every original column in
/// header order plus a trailing `period` column.
pub fn export_detailed(
    log: &EventLog,
    range: &DateRange,
    granularity: Granularity,
    policy: BucketPolicy,
) -> Result<ExportArtifact> {
    let mut writer = csv_writer();

    let header = log
        .columns
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(PERIOD_COLUMN));
    writer.write_record(header)?;

    for event in UsageAggregator::filter_events(&log.events, range) {
        let period = format_date(UsageAggregator::bucket_of(event, granularity, policy));
        let row = event
            .fields
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(period.as_str()));
        writer.write_record(row)?;
    }
    finish(writer)
}

/// Read an aggregated export back into its points, in file order.
pub fn read_series_export(content: &str) -> Result<Vec<SeriesPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());

    let header = reader.headers()?;
    if header.iter().ne(SERIES_HEADER) {
        return Err(UsageError::Schema {
            column: SERIES_HEADER.join(","),
            found: header.iter().collect::<Vec<_>>().join(", "),
        });
    }

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let period = parse_date(record.get(0).unwrap_or(""))?;
        let raw_count = record.get(1).unwrap_or("");
        let count = raw_count.parse::<u64>().map_err(|e| {
            UsageError::Other(anyhow::anyhow!("invalid count \"{}\": {}", raw_count, e))
        })?;
        points.push(SeriesPoint { period, count });
    }
    Ok(points)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<ExportArtifact> {
    let bytes = writer
        .into_inner()
        .map_err(|e| UsageError::Io(e.into_error()))?;
    let content = String::from_utf8(bytes).map_err(|e| UsageError::Other(e.into()))?;
    Ok(ExportArtifact {
        content,
        media_type: CSV_MEDIA_TYPE.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{parse_events, IngestOptions};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn series(granularity: Granularity, points: &[(&str, u64)]) -> AggregatedSeries {
        AggregatedSeries {
            granularity,
            points: points
                .iter()
                .map(|(d, c)| SeriesPoint {
                    period: date(d),
                    count: *c,
                })
                .collect(),
        }
    }

    fn log(text: &str) -> EventLog {
        parse_events(text.as_bytes(), &IngestOptions::default()).unwrap()
    }

    // ── export_series ─────────────────────────────────────────────────────────

    #[test]
    fn test_export_series_content() {
        let s = series(Granularity::Day, &[("2024-01-01", 2), ("2024-01-02", 1)]);
        let artifact = export_series(&s).unwrap();
        assert_eq!(artifact.content, "period,count\n2024-01-01,2\n2024-01-02,1\n");
        assert_eq!(artifact.media_type, "text/csv");
    }

    #[test]
    fn test_export_empty_series_has_header_only() {
        let artifact = export_series(&AggregatedSeries::empty(Granularity::Month)).unwrap();
        assert_eq!(artifact.content, "period,count\n");
    }

    #[test]
    fn test_export_is_deterministic() {
        let s = series(Granularity::Week, &[("2024-01-01", 3), ("2024-01-08", 0)]);
        assert_eq!(export_series(&s).unwrap(), export_series(&s).unwrap());
    }

    #[test]
    fn test_export_round_trip_preserves_order() {
        let s = series(
            Granularity::Month,
            &[("2023-11-01", 10), ("2023-12-01", 0), ("2024-01-01", 12_345)],
        );
        let artifact = export_series(&s).unwrap();
        let back = read_series_export(&artifact.content).unwrap();
        assert_eq!(back, s.points);
    }

    #[test]
    fn test_read_series_export_rejects_wrong_header() {
        let err = read_series_export("day,n\n2024-01-01,1\n").unwrap_err();
        assert!(matches!(err, UsageError::Schema { .. }));
    }

    #[test]
    fn test_read_series_export_rejects_bad_count() {
        let err = read_series_export("period,count\n2024-01-01,-1\n").unwrap_err();
        assert!(err.to_string().contains("invalid count"));
    }

    // ── export_detailed ───────────────────────────────────────────────────────

    #[test]
    fn test_export_detailed_filters_and_appends_period() {
        let log = log("timestamp,user\n\
                       2024-01-03T10:00:00Z,alice\n\
                       2023-12-31T10:00:00Z,bob\n\
                       2024-01-09T10:00:00Z,carol\n");
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();
        let artifact =
            export_detailed(&log, &range, Granularity::Week, BucketPolicy::default()).unwrap();
        assert_eq!(
            artifact.content,
            "timestamp,user,period\n\
             2024-01-03T10:00:00Z,alice,2024-01-01\n\
             2024-01-09T10:00:00Z,carol,2024-01-08\n"
        );
    }

    #[test]
    fn test_export_detailed_quotes_special_values() {
        let log = log("timestamp,note\n2024-01-01,\"hello, \"\"world\"\"\"\n");
        let range = DateRange::new(date("2024-01-01"), date("2024-01-01")).unwrap();
        let artifact =
            export_detailed(&log, &range, Granularity::Day, BucketPolicy::default()).unwrap();
        assert_eq!(
            artifact.content,
            "timestamp,note,period\n2024-01-01,\"hello, \"\"world\"\"\",2024-01-01\n"
        );
    }

    #[test]
    fn test_export_detailed_empty_range_has_header_only() {
        let log = log("timestamp\n2024-01-01\n");
        let range = DateRange::new(date("2025-01-01"), date("2025-01-31")).unwrap();
        let artifact =
            export_detailed(&log, &range, Granularity::Month, BucketPolicy::default()).unwrap();
        assert_eq!(artifact.content, "timestamp,period\n");
    }

    // ── suggested_filename ────────────────────────────────────────────────────

    #[test]
    fn test_suggested_filename_pads_date() {
        assert_eq!(
            suggested_filename(ExportKind::Aggregated, date("2024-01-05")),
            "Usage_Data_2024-01-05.csv"
        );
    }
}
