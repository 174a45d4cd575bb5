//! Request-scoped pipeline driver.
//!
//! The shell hands over one [`PipelineRequest`] per interaction holding the
//! raw upload and widget values. Every parameter is validated before the
//! upload is parsed, and the upload is parsed in full before any bucketing,
//! so a failure never exposes partial results.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use usage_core::error::{Result, UsageError};
use usage_core::models::{
    AggregatedSeries, BucketPolicy, DateRange, EventLog, Granularity, SeriesPoint,
};
use usage_core::time_utils::parse_date;

use crate::aggregator::UsageAggregator;
use crate::exporter::{export_detailed, export_series, ExportArtifact};
use crate::reader::{parse_events, IngestOptions};

// ── Public types ──────────────────────────────────────────────────────────────

/// Raw inputs supplied by the shell for one run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRequest<'a> {
    /// Upload contents.
    pub input: &'a [u8],
    /// Selector value, expected to be `day`, `week` or `month`.
    pub granularity: &'a str,
    /// First day of the range, `YYYY-MM-DD`.
    pub start_date: &'a str,
    /// Last day of the range, `YYYY-MM-DD`.
    pub end_date: &'a str,
    /// Reference line value.
    pub threshold: f64,
    /// Requested y-axis bounds, if any.
    pub y_axis: Option<(u64, u64)>,
}

/// Policy that stays fixed across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub ingest: IngestOptions,
    pub policy: BucketPolicy,
}

/// Counts describing one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// Data rows in the upload.
    pub rows_read: usize,
    /// Rows dropped for an unparseable timestamp.
    pub rows_rejected: usize,
    /// Events that passed the date-range filter.
    pub events_in_range: u64,
    pub bucket_count: usize,
    pub peak: Option<SeriesPoint>,
    /// Mean events per bucket.
    pub mean: f64,
}

/// Values the shell needs to draw the chart around the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartHints {
    /// Where the reference line sits.
    pub threshold: f64,
    /// Buckets whose count is strictly above the reference line.
    pub buckets_above_threshold: usize,
    pub y_axis_min: u64,
    pub y_axis_max: u64,
}

/// The complete output of [`run_pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub series: AggregatedSeries,
    pub summary: SeriesSummary,
    pub chart: ChartHints,
    /// The series as a `period,count` artifact.
    #[serde(skip)]
    pub export: ExportArtifact,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Run the full pipeline for one request.
///
/// 1. Validate granularity, dates and axis hint.
/// 2. Parse the upload into events.
/// 3. Filter to the range and count per bucket.
/// 4. Export the series and summarise.
///
/// An empty series is a successful result, not an error.
pub fn run_pipeline(
    request: &PipelineRequest<'_>,
    options: &PipelineOptions,
) -> Result<PipelineResult> {
    // ── Step 1: Parameters ────────────────────────────────────────────────────
    let params = validate(request)?;

    // ── Step 2: Ingest ────────────────────────────────────────────────────────
    let load_start = Instant::now();
    let log = parse_events(request.input, &options.ingest)?;
    debug!("Ingest took {:?}", load_start.elapsed());

    // ── Step 3: Bucket ────────────────────────────────────────────────────────
    let series = UsageAggregator::filter_and_bucket(
        &log.events,
        &params.range,
        params.granularity,
        options.policy,
    );

    // ── Step 4: Export + summary ──────────────────────────────────────────────
    let export = export_series(&series)?;
    let summary = summarize(&log, &series);
    let chart = chart_hints(&series, request.threshold, params.y_axis);

    info!(
        "{} {} buckets from {} to {}: {} of {} events",
        series.len(),
        params.granularity,
        params.range.start(),
        params.range.end(),
        summary.events_in_range,
        log.len()
    );

    Ok(PipelineResult {
        series,
        summary,
        chart,
        export,
    })
}

/// Validate the request like [`run_pipeline`] and produce the per-event
/// export for the same range and granularity.
pub fn detailed_export(
    request: &PipelineRequest<'_>,
    options: &PipelineOptions,
) -> Result<ExportArtifact> {
    let params = validate(request)?;
    let log = parse_events(request.input, &options.ingest)?;
    export_detailed(&log, &params.range, params.granularity, options.policy)
}

/// Parse the selector value and date bounds into typed parameters.
pub fn parse_parameters(
    granularity: &str,
    start_date: &str,
    end_date: &str,
) -> Result<(Granularity, DateRange)> {
    let granularity = granularity.parse::<Granularity>()?;
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;
    Ok((granularity, DateRange::new(start, end)?))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

struct ValidatedParams {
    granularity: Granularity,
    range: DateRange,
    y_axis: Option<(u64, u64)>,
}

fn validate(request: &PipelineRequest<'_>) -> Result<ValidatedParams> {
    let (granularity, range) =
        parse_parameters(request.granularity, request.start_date, request.end_date)?;

    if let Some((min, max)) = request.y_axis {
        if min > max {
            return Err(UsageError::InvalidAxisRange { min, max });
        }
    }

    Ok(ValidatedParams {
        granularity,
        range,
        y_axis: request.y_axis,
    })
}

fn summarize(log: &EventLog, series: &AggregatedSeries) -> SeriesSummary {
    SeriesSummary {
        rows_read: log.rows_read,
        rows_rejected: log.rows_rejected,
        events_in_range: series.total(),
        bucket_count: series.len(),
        peak: series.peak(),
        mean: series.mean(),
    }
}

/// Without an explicit axis the chart spans zero to whichever is higher of
/// the peak count and the reference line.
fn chart_hints(
    series: &AggregatedSeries,
    threshold: f64,
    y_axis: Option<(u64, u64)>,
) -> ChartHints {
    let (y_axis_min, y_axis_max) = y_axis.unwrap_or_else(|| {
        let peak = series.peak().map(|p| p.count).unwrap_or(0);
        let line = if threshold.is_finite() && threshold > 0.0 {
            threshold.ceil() as u64
        } else {
            0
        };
        (0, peak.max(line))
    });

    ChartHints {
        threshold,
        buckets_above_threshold: series.buckets_above(threshold),
        y_axis_min,
        y_axis_max,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
