//! Error types for table loading, configuration and detector runs.

use thiserror::Error;

/// Errors raised while reading, writing or interpreting an [`ObservationTable`].
///
/// [`ObservationTable`]: crate::table::ObservationTable
#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("malformed value '{value}' in column '{column}' at row {row}")]
    Malformed {
        column: String,
        row: usize,
        value: String,
    },

    #[error("column '{column}' has {found} values, table has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column '{0}' already exists")]
    DuplicateColumn(String),
}

/// Invalid detector or threshold parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("threshold list is empty")]
    NoThresholds,

    #[error("threshold {0} must be finite and greater than zero")]
    InvalidThreshold(f64),

    #[error("threshold {0} is listed more than once")]
    DuplicateThreshold(f64),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Failure of one detector on one table.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
