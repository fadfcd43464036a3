use chrono::NaiveDate;
use thiserror::Error;

/// Input errors that abort generation of a single invoice
#[derive(Debug, Error, PartialEq)]
pub enum GenerationError {
    #[error("{requested} fee lines requested but no timekeepers were supplied")]
    NoTimekeepers { requested: usize },

    #[error("billing start {start} is after billing end {end}")]
    InvalidBillingPeriod { start: NaiveDate, end: NaiveDate },

    #[error("max daily hours must be positive, got {0}")]
    InvalidMaxDailyHours(f64),

    #[error("invalid amount range {min}..{max} for {name}")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("unknown mandatory item: {0}")]
    UnknownMandatoryItem(String),
}

/// Errors raised while reading catalog files
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("unsupported catalog format: {0}")]
    UnsupportedFormat(String),
}

/// Errors raised while parsing LEDES text
#[derive(Debug, Error, PartialEq)]
pub enum LedesError {
    #[error("missing LEDES1998B marker line")]
    MissingMarker,

    #[error("header does not match LEDES 1998B field list")]
    BadHeader,

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: record is not terminated with []")]
    Unterminated { line: usize },

    #[error("line {line}: invalid {field}: {value}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
}
