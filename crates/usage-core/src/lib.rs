//! Core types for usage report: the event and series models, the error
//! taxonomy, timestamp and calendar helpers, CLI settings and number
//! formatting shared by the data and binary crates.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{Result, UsageError};
