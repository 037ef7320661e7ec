//! Error types for budget extraction and consolidation.
//!
//! Structural absence (empty sheet, no "COSTI" marker, no valid rows) is not
//! an error: those paths return `Option::None` and are logged.

use std::path::PathBuf;
use thiserror::Error;

/// Failures local to a single worksheet.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SheetError {
    /// A column that must be dropped after cropping is not in the header row
    #[error("column '{0}' not found in header row")]
    MissingColumn(String),

    /// A numeric column holds a value that cannot be read as a number
    #[error("cannot convert '{value}' in column '{column}' (row {row}) to a number")]
    InvalidNumber {
        column: String,
        row: usize,
        value: String,
    },

    /// The cost code column holds a value that is not an integer code
    #[error("invalid cost code '{value}' (row {row})")]
    InvalidCode { row: usize, value: String },
}

impl SheetError {
    /// True for the missing-percentage-column case, which marks sheets
    /// without a cost table rather than malformed ones.
    pub fn is_missing_inc_column(&self) -> bool {
        matches!(self, SheetError::MissingColumn(c) if c == crate::sheet_specs::INC_PERC)
    }
}

/// Errors raised by the consolidation pipeline.
#[derive(Error, Debug)]
pub enum ConsolidaError {
    /// IO error (file reading, cache writes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The workbook could not be opened or a sheet could not be read
    #[error("cannot read workbook '{path}': {message}")]
    Workbook { path: PathBuf, message: String },

    /// A sheet failed for a reason other than a missing cost table
    #[error("problem while analyzing fase '{sheet}' of file '{path}': {source}")]
    Sheet {
        path: PathBuf,
        sheet: String,
        #[source]
        source: SheetError,
    },

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (cache blob) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory walk error
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// TOML configuration parse error
    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// A folder does not follow the year/month naming conventions
    #[error("cannot read date from folder '{path}': {reason}")]
    FolderDate { path: PathBuf, reason: String },

    /// Invalid date interval
    #[error("invalid date interval: {0}")]
    Interval(String),

    /// Two or more rewrite rules map the same row to different categories
    #[error("ambiguous tipologia change defined for '{voce}':\n{rules}")]
    AmbiguousRewrite { voce: String, rules: String },

    /// A matched row no longer carries the category the rule rewrites from
    #[error("row {row}: expected tipologia '{expected}' before rewrite, found '{found}'")]
    StaleRewrite {
        row: usize,
        expected: String,
        found: String,
    },
}

/// Result type for consolidation operations.
pub type Result<T> = std::result::Result<T, ConsolidaError>;
