//! Error types for agristat.

use thiserror::Error;

use crate::dataframe::DataType;

/// All errors produced by agristat operations.
///
/// A rejected normality check is not an error: it is reported as
/// [`GateOutcome::Halted`](crate::session::GateOutcome::Halted).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgriError {
    /// No columns, or no rows left after dropping fully-missing rows.
    #[error("table is empty: {0}")]
    EmptyTable(String),
    /// Two headers share the same name.
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    /// A grid row does not have one cell per header.
    #[error("row {row} has {actual} cells, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
    /// Too few usable observations for the requested operation.
    #[error("need at least {min_required} observations, got {actual}")]
    InsufficientData { min_required: usize, actual: usize },
    /// A required role is unbound, or bound to a column the table lacks.
    #[error("{}", missing_role_message(.role, .column.as_deref()))]
    MissingRole {
        role: String,
        column: Option<String>,
    },
    /// A role expects numeric data but the bound column holds text.
    #[error("column '{column}' is {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: DataType,
        found: DataType,
    },
    /// The statistical routine itself failed.
    #[error("{kind} failed: {cause}")]
    AnalysisFailed { kind: String, cause: String },
    /// A chart could not be rendered or written.
    #[error("chart rendering failed: {0}")]
    ChartRender(String),
    /// The report document could not be produced.
    #[error("report export failed: {0}")]
    Export(String),
    /// CSV parsing failed.
    #[error("CSV parse error at line {line}: {message}")]
    CsvParse { line: usize, message: String },
    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// I/O error while reading input.
    #[error("I/O error: {0}")]
    Io(String),
}

fn missing_role_message(role: &str, column: Option<&str>) -> String {
    match column {
        Some(column) => format!("column '{column}' bound to role '{role}' not found"),
        None => format!("role '{role}' is not bound to a column"),
    }
}

impl From<std::io::Error> for AgriError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<zip::result::ZipError> for AgriError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Export(e.to_string())
    }
}

impl From<toml::de::Error> for AgriError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.message().to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AgriError>;
