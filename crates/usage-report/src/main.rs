mod bootstrap;
mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use usage_core::models::{BucketPolicy, WeekStart};
use usage_core::settings::Settings;
use usage_data::analysis::{detailed_export, run_pipeline, PipelineOptions, PipelineRequest};
use usage_data::exporter::{suggested_filename, ExportArtifact, ExportKind};
use usage_data::reader::{read_input, IngestOptions};

use crate::render::OutputFormat;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    if let Err(e) = settings.persist_last_used() {
        tracing::warn!("Could not update saved settings: {}", e);
    }

    tracing::info!("usage-report v{} starting", env!("CARGO_PKG_VERSION"));

    let options = PipelineOptions {
        ingest: IngestOptions::new(settings.max_input_bytes, &settings.assume_timezone)?,
        policy: BucketPolicy {
            week_start: settings.week_start.parse::<WeekStart>()?,
            fill_gaps: settings.fill_gaps,
        },
    };

    let today = Utc::now().date_naive();
    let (start_date, end_date) = settings.date_bounds(today);
    tracing::info!(
        "Input: {}, granularity: {}, range: {} to {}",
        settings.input.display(),
        settings.granularity,
        start_date,
        end_date
    );

    let input = read_input(&settings.input, settings.max_input_bytes)?;

    let request = PipelineRequest {
        input: &input,
        granularity: &settings.granularity,
        start_date: &start_date,
        end_date: &end_date,
        threshold: settings.threshold,
        y_axis: settings.y_axis(),
    };

    let result = run_pipeline(&request, &options)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    render::render(&result, OutputFormat::from_flag(&settings.format), &mut out)?;

    if let Some(dir) = &settings.export_dir {
        write_export(dir, ExportKind::Aggregated, today, &result.export)?;
        if settings.export_detailed {
            let detailed = detailed_export(&request, &options)?;
            write_export(dir, ExportKind::Detailed, today, &detailed)?;
        }
    }

    Ok(())
}

/// Write `artifact` into `dir` under its suggested name, creating the
/// directory if needed.
fn write_export(
    dir: &Path,
    kind: ExportKind,
    today: NaiveDate,
    artifact: &ExportArtifact,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
    let path = dir.join(suggested_filename(kind, today));
    std::fs::write(&path, &artifact.content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Wrote {} ({} bytes)", path.display(), artifact.content.len());
    Ok(path)
}
