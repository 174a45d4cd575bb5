//! Data layer for usage report.
//!
//! Reads an uploaded event log, filters it to a date range, buckets the
//! events by day, week or month and exports the results as delimited text.
//! [`analysis::run_pipeline`] ties the steps together for one request.

pub mod aggregator;
pub mod analysis;
pub mod exporter;
pub mod reader;

pub use usage_core as core;
