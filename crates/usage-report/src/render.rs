//! Plain-text presentation of a pipeline result on stdout.

use std::io::Write;

use usage_core::formatting::{bar, format_average, format_count, share_percent};
use usage_core::time_utils::format_date;
use usage_data::analysis::PipelineResult;

/// Width of the bar column in cells.
const BAR_WIDTH: usize = 40;

/// Output formats accepted by `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    /// Map a `--format` value; anything unrecognised renders as a table.
    pub fn from_flag(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            "csv" => Self::Csv,
            _ => Self::Table,
        }
    }
}

/// Write `result` to `out` in the requested format.
pub fn render(
    result: &PipelineResult,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => render_table(result, out)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => out.write_all(result.export.content.as_bytes())?,
    }
    Ok(())
}

/// One row per bucket with its share of the total and a bar scaled to the
/// chart's y-axis, followed by the summary lines.
pub fn render_table(result: &PipelineResult, out: &mut impl Write) -> std::io::Result<()> {
    let summary = &result.summary;
    let chart = &result.chart;

    if result.series.is_empty() {
        writeln!(out, "No events in the selected date range.")?;
        writeln!(
            out,
            "Rows read: {}, rejected: {}",
            format_count(summary.rows_read as u64),
            format_count(summary.rows_rejected as u64)
        )?;
        return Ok(());
    }

    let unit = result.series.granularity;
    let total = result.series.total();
    let count_width = format_count(total).len().max("Count".len());
    let mark_threshold = chart.threshold > 0.0;

    writeln!(
        out,
        "{:<10}  {:>cw$}  {:>6}",
        "Period",
        "Count",
        "Share",
        cw = count_width
    )?;
    writeln!(out, "{}", "─".repeat(10 + 2 + count_width + 2 + 6))?;

    for point in result.series.iter() {
        let marker = if mark_threshold && point.count as f64 > chart.threshold {
            "▲"
        } else {
            " "
        };
        writeln!(
            out,
            "{:<10}  {:>cw$}  {:>5.1}% {} {}",
            format_date(point.period),
            format_count(point.count),
            share_percent(point.count, total),
            marker,
            bar(point.count, chart.y_axis_max, BAR_WIDTH),
            cw = count_width
        )?;
    }

    writeln!(out, "{}", "─".repeat(10 + 2 + count_width + 2 + 6))?;
    writeln!(
        out,
        "{:<10}  {:>cw$}",
        "Total",
        format_count(total),
        cw = count_width
    )?;
    writeln!(out)?;

    if let Some(peak) = summary.peak {
        writeln!(
            out,
            "Peak {}: {} ({}), mean {} per {}",
            unit,
            peak.period,
            format_count(peak.count),
            format_average(summary.mean, 2),
            unit
        )?;
    }
    if mark_threshold {
        writeln!(
            out,
            "Threshold {}: {} of {} buckets above",
            format_average(chart.threshold, 1),
            chart.buckets_above_threshold,
            summary.bucket_count
        )?;
    }
    writeln!(
        out,
        "Rows read: {}, rejected: {}, in range: {}",
        format_count(summary.rows_read as u64),
        format_count(summary.rows_rejected as u64),
        format_count(summary.events_in_range)
    )?;
    Ok(())
}
