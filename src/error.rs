// ⚠️ Errors - Typed failures for parsing, record construction and configuration

use thiserror::Error;

/// Failures while reading a fixed-format legacy line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Date token present but not in `YYYY-MM-DD` form
    #[error("Malformed date: {0:?} (expected YYYY-MM-DD)")]
    MalformedDate(String),

    /// One or more of the required labeled fields is absent or empty
    #[error("Incomplete record: missing {}", .missing.join(", "))]
    IncompleteRecord { missing: Vec<&'static str> },

    /// Income token is not a non-negative decimal once `$` and `,` are removed
    #[error("Malformed income: {0:?}")]
    MalformedIncome(String),
}

/// Failures while building a validated `LegacyEntry`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Tax identifier does not match `NNN.NNN.NNN-NN`
    #[error("Invalid identifier format: {0:?} (expected NNN.NNN.NNN-NN)")]
    InvalidIdentifierFormat(String),

    /// Amount field is negative or not finite
    #[error("Invalid amount for {field}: {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    /// Required field absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field present but could not be interpreted
    #[error("Malformed {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },

    /// Row or payload element that could not be read as a record at all
    #[error("Unreadable record: {0}")]
    Unreadable(String),
}

/// Configuration loading or validation error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}
