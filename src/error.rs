//! Error types surfaced to callers of the report engine.

use chrono::NaiveDate;
use thiserror::Error;

/// A custom range that cannot be turned into a window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRangeError {
    /// `custom` was requested without both bounds
    #[error("custom range requires both `from` and `to` dates")]
    MissingBound,

    /// A bound is not a `YYYY-MM-DD` calendar date
    #[error("invalid date '{value}': expected YYYY-MM-DD")]
    MalformedDate { value: String },

    /// `from` comes after `to`
    #[error("range start {from} is after range end {to}")]
    Inverted { from: NaiveDate, to: NaiveDate },

    /// Date arithmetic left the representable calendar
    #[error("range falls outside the supported calendar")]
    OutOfRange,
}

/// Failures of a report-generation request.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Rejected before any read or aggregation ran
    #[error("invalid range: {0}")]
    InvalidRange(#[from] InvalidRangeError),

    /// The record store could not be read; fatal for the request
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl ReportError {
    /// HTTP status code an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ReportError::InvalidRange(_) => 400,
            ReportError::Persistence(_) => 500,
        }
    }
}
