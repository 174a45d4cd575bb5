use chrono::{Days, NaiveDate};
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::time_utils::format_date;

/// Default upload limit: 50 MiB.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

/// Days covered by the default date range, ending today.
pub const DEFAULT_RANGE_DAYS: u64 = 30;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Usage count analysis over a timestamped CSV event log
#[derive(Parser, Debug, Clone)]
#[command(
    name = "usage-report",
    about = "Usage count analysis over a timestamped CSV event log",
    version
)]
pub struct Settings {
    /// CSV file with a `timestamp` column
    pub input: PathBuf,

    /// Time period to count events by
    #[arg(long, default_value = "day", value_parser = ["day", "week", "month"])]
    pub granularity: String,

    /// First day of the range, inclusive (default: 30 days before today)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last day of the range, inclusive (default: today)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Reference line value
    #[arg(long, default_value = "0")]
    pub threshold: f64,

    /// Lower bound of the y-axis (requires --y-max)
    #[arg(long, requires = "y_max")]
    pub y_min: Option<u64>,

    /// Upper bound of the y-axis (requires --y-min)
    #[arg(long, requires = "y_min")]
    pub y_max: Option<u64>,

    /// First day of a week bucket
    #[arg(long, default_value = "monday", value_parser = ["monday", "sunday"])]
    pub week_start: String,

    /// Emit zero-count periods between observed ones
    #[arg(
        long,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub fill_gaps: bool,

    /// Timezone for timestamps without an explicit offset
    #[arg(long, default_value = "UTC")]
    pub assume_timezone: String,

    /// Reject inputs larger than this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_INPUT_BYTES)]
    pub max_input_bytes: u64,

    /// Output format for stdout
    #[arg(long, default_value = "table", value_parser = ["table", "json", "csv"])]
    pub format: String,

    /// Directory to write the aggregated export into
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Also write the detailed (per-event) export
    #[arg(long, requires = "export_dir")]
    pub export_detailed: bool,

    /// Logging level
    #[arg(
        long,
        default_value = "WARNING",
        value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]
    )]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Selector values remembered between runs in `~/.usage-report/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_gaps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assume_timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl LastUsedParams {
    /// Default location, `~/.usage-report/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// The config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".usage-report").join("last_used.json")
    }

    /// Load persisted params; `Default` when the file is absent or unreadable.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at `path` if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and merge remembered selector values
    /// where no explicit flag was given.
    ///
    /// Nothing is written here; call [`Settings::persist_last_used`] once
    /// logging is up so that a failure to save can be reported.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit arguments and
    /// config location.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            return Self::resolve_overrides(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // NOTE: clap keys args by field name (underscores), not flag spelling.
        if !is_arg_explicitly_set(&matches, "granularity") {
            if let Some(v) = last.granularity {
                settings.granularity = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "week_start") {
            if let Some(v) = last.week_start {
                settings.week_start = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "threshold") {
            if let Some(v) = last.threshold {
                settings.threshold = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "fill_gaps") {
            if let Some(v) = last.fill_gaps {
                settings.fill_gaps = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "assume_timezone") {
            if let Some(v) = last.assume_timezone {
                settings.assume_timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = last.format {
                settings.format = v;
            }
        }

        Self::resolve_overrides(settings)
    }

    /// Save the current selector values to the default location, or delete
    /// the saved file when `--clear` was given.
    pub fn persist_last_used(&self) -> Result<(), std::io::Error> {
        self.persist_last_used_at(&LastUsedParams::config_path())
    }

    /// Same as [`Settings::persist_last_used`] with an explicit location.
    pub fn persist_last_used_at(
        &self,
        config_path: &std::path::Path,
    ) -> Result<(), std::io::Error> {
        if self.clear {
            LastUsedParams::clear_at(config_path)
        } else {
            LastUsedParams::from(self).save_to(config_path)
        }
    }

    /// The raw start and end bounds to hand to the pipeline, filling in the
    /// default window ending on `today` for any bound not given.
    pub fn date_bounds(&self, today: NaiveDate) -> (String, String) {
        let start = self.start_date.clone().unwrap_or_else(|| {
            let d = today
                .checked_sub_days(Days::new(DEFAULT_RANGE_DAYS))
                .unwrap_or(today);
            format_date(d)
        });
        let end = self.end_date.clone().unwrap_or_else(|| format_date(today));
        (start, end)
    }

    /// The y-axis hint, present only when both bounds were given.
    pub fn y_axis(&self) -> Option<(u64, u64)> {
        self.y_min.zip(self.y_max)
    }

    fn resolve_overrides(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            granularity: Some(s.granularity.clone()),
            week_start: Some(s.week_start.clone()),
            threshold: Some(s.threshold),
            fill_gaps: Some(s.fill_gaps),
            assume_timezone: Some(s.assume_timezone.clone()),
            format: Some(s.format.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied on the command line rather than
/// coming from a default value.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
