//! Column-major table for experimental data.
//!
//! A [`Table`] is built once from a spreadsheet-like grid of strings with
//! [`build_table`]. Every cell is classified exactly once as a number, a
//! text label, or missing; analysis code never re-parses cell strings.
//!
//! # Column Types
//!
//! | Type | Storage | Use case |
//! |------|---------|----------|
//! | [`Numeric`](Column::Numeric) | `Vec<Option<f64>>` | Measurements, yields, doses |
//! | [`Text`](Column::Text) | `Vec<Option<String>>` | Variety names, treatments, plots |
//!
//! A column is numeric if every non-missing cell parses as a number.
//!
//! # Example
//!
//! ```
//! use agristat::dataframe::{build_table, DataType};
//!
//! let headers = vec!["Variety".to_string(), "Yield".to_string()];
//! let grid = vec![
//!     vec!["Alpha".to_string(), "4.2".to_string()],
//!     vec!["".to_string(), "".to_string()],
//!     vec!["Beta".to_string(), "5,1".to_string()],
//! ];
//! let table = build_table(&grid, &headers).unwrap();
//! assert_eq!(table.row_count(), 2); // the blank row is dropped
//! assert_eq!(table.column(1).unwrap().data_type(), DataType::Numeric);
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AgriError, Result};

// ── Cell / DataType ───────────────────────────────────────────────────

/// A single classified cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A finite number.
    Number(f64),
    /// A non-numeric label.
    Text(String),
    /// An empty cell.
    Missing,
}

impl Cell {
    /// Classifies a raw cell string.
    ///
    /// Surrounding whitespace is ignored. A decimal comma (`"3,5"`) is
    /// accepted when the string has no other separator, since field
    /// sheets are often typed with a comma locale.
    ///
    /// ```
    /// use agristat::dataframe::Cell;
    ///
    /// assert_eq!(Cell::parse("  "), Cell::Missing);
    /// assert_eq!(Cell::parse("2.5"), Cell::Number(2.5));
    /// assert_eq!(Cell::parse("2,5"), Cell::Number(2.5));
    /// assert_eq!(Cell::parse("Alpha"), Cell::Text("Alpha".into()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Self::Missing;
        }
        match parse_number(s) {
            Some(v) => Self::Number(v),
            None => Self::Text(s.to_string()),
        }
    }

    /// Returns `true` if the cell is missing.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let parsed = match s.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) if s.matches(',').count() == 1 && !s.contains('.') => {
            s.replace(',', ".").parse::<f64>().ok()
        }
        Err(_) => None,
    };
    // "NaN" and "inf" parse as f64 but are not measurements.
    parsed.filter(|v| v.is_finite())
}

/// Data type inferred for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Every non-missing cell is a number.
    Numeric,
    /// At least one cell is a non-numeric label.
    Text,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => write!(f, "Numeric"),
            Self::Text => write!(f, "Text"),
        }
    }
}

// ── Column ────────────────────────────────────────────────────────────

/// A typed column; `None` marks a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    /// Text labels. Numbers mixed into a text column keep their
    /// original spelling.
    Text(Vec<Option<String>>),
}

impl Column {
    /// Infers the column type from classified cells.
    pub fn from_cells(cells: &[Cell], raw: &[&str]) -> Self {
        if cells.iter().all(|c| !matches!(c, Cell::Text(_))) {
            return Self::Numeric(
                cells
                    .iter()
                    .map(|c| match c {
                        Cell::Number(v) => Some(*v),
                        _ => None,
                    })
                    .collect(),
            );
        }
        Self::Text(
            cells
                .iter()
                .zip(raw)
                .map(|(c, r)| (!c.is_missing()).then(|| r.trim().to_string()))
                .collect(),
        )
    }

    /// Returns the data type of this column.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Numeric(_) => DataType::Numeric,
            Self::Text(_) => DataType::Text,
        }
    }

    /// Returns the number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Returns `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of non-missing values.
    pub fn valid_count(&self) -> usize {
        match self {
            Self::Numeric(v) => v.iter().flatten().count(),
            Self::Text(v) => v.iter().flatten().count(),
        }
    }

    /// Returns the number of missing values.
    pub fn null_count(&self) -> usize {
        self.len() - self.valid_count()
    }

    /// Returns `true` if the value at `idx` is not missing.
    pub fn is_valid(&self, idx: usize) -> bool {
        match self {
            Self::Numeric(v) => matches!(v.get(idx), Some(Some(_))),
            Self::Text(v) => matches!(v.get(idx), Some(Some(_))),
        }
    }

    /// Returns the numeric value at `idx`, or `None` if missing or text.
    pub fn number_at(&self, idx: usize) -> Option<f64> {
        match self {
            Self::Numeric(v) => v.get(idx).copied().flatten(),
            Self::Text(_) => None,
        }
    }

    /// Returns non-missing numeric values as a new `Vec<f64>`.
    pub fn valid_numeric_values(&self) -> Option<Vec<f64>> {
        match self {
            Self::Numeric(v) => Some(v.iter().flatten().copied().collect()),
            Self::Text(_) => None,
        }
    }

    /// Returns the cell at `idx`.
    pub fn cell(&self, idx: usize) -> Cell {
        let cell = match self {
            Self::Numeric(v) => v.get(idx).copied().flatten().map(Cell::Number),
            Self::Text(v) => v.get(idx).cloned().flatten().map(Cell::Text),
        };
        cell.unwrap_or(Cell::Missing)
    }

    /// Returns the group label at `idx`, for use as a factor level.
    ///
    /// Works for both column types so that coded treatments (`1`, `2`, `3`)
    /// can serve as factors.
    pub fn level_at(&self, idx: usize) -> Option<String> {
        match self.cell(idx) {
            Cell::Number(v) => Some(format_number(v)),
            Cell::Text(s) => Some(s),
            Cell::Missing => None,
        }
    }

    /// Returns the display string at `idx` (empty when missing).
    pub fn display_at(&self, idx: usize) -> String {
        self.level_at(idx).unwrap_or_default()
    }
}

/// Formats a number the way it is shown in tables and factor levels.
pub fn format_number(v: f64) -> String {
    format!("{v}")
}

// ── Table ─────────────────────────────────────────────────────────────

/// Column-major experimental data table.
///
/// All columns have the same number of rows and column names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Assembles a table from already-built columns.
    ///
    /// Returns an error for duplicate names or unequal lengths.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self> {
        let row_count = columns.first().map_or(0, |(_, c)| c.len());
        {
            let mut seen = HashSet::new();
            for (name, col) in &columns {
                if !seen.insert(name.as_str()) {
                    return Err(AgriError::DuplicateColumn(name.clone()));
                }
                if col.len() != row_count {
                    return Err(AgriError::DimensionMismatch {
                        row: 0,
                        expected: row_count,
                        actual: col.len(),
                    });
                }
            }
        }
        let (names, columns) = columns.into_iter().unzip();
        Ok(Self {
            names,
            columns,
            row_count,
        })
    }

    /// Returns the number of rows.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns the number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the table has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns column names in order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Returns a reference to the column at `index`.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns a reference to the column with the given `name`.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Returns the index of the column with the given `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Returns the cell at (`row`, `col`).
    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        if row >= self.row_count {
            return None;
        }
        self.columns.get(col).map(|c| c.cell(row))
    }

    /// Returns an iterator over (name, column) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(|s| s.as_str()).zip(self.columns.iter())
    }

    /// Returns a summary of column data types.
    pub fn schema(&self) -> Vec<(&str, DataType)> {
        self.iter().map(|(name, col)| (name, col.data_type())).collect()
    }

    /// Returns the names of all numeric columns.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, c)| c.data_type() == DataType::Numeric)
            .map(|(n, _)| n)
            .collect()
    }

    /// Returns the row at `row` as display strings.
    pub fn display_row(&self, row: usize) -> Vec<String> {
        self.columns.iter().map(|c| c.display_at(row)).collect()
    }
}

// ── Construction ──────────────────────────────────────────────────────

/// Transcribes a grid of raw cell strings into a [`Table`].
///
/// Each cell becomes a number, a text label, or missing (empty string).
/// Rows in which every cell is missing are dropped.
///
/// # Errors
///
/// - [`AgriError::EmptyTable`] if there are no headers or no rows remain
/// - [`AgriError::DuplicateColumn`] if two headers are equal
/// - [`AgriError::DimensionMismatch`] if a row width differs from the header count
pub fn build_table<S: AsRef<str>>(grid: &[Vec<S>], headers: &[S]) -> Result<Table> {
    if headers.is_empty() {
        return Err(AgriError::EmptyTable("no columns".into()));
    }

    let names: Vec<String> = headers.iter().map(|h| h.as_ref().trim().to_string()).collect();
    {
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(AgriError::DuplicateColumn(name.clone()));
            }
        }
    }

    let n_cols = names.len();
    let mut kept: Vec<(Vec<Cell>, Vec<&str>)> = Vec::with_capacity(grid.len());
    for (row_idx, row) in grid.iter().enumerate() {
        if row.len() != n_cols {
            return Err(AgriError::DimensionMismatch {
                row: row_idx,
                expected: n_cols,
                actual: row.len(),
            });
        }
        let raw: Vec<&str> = row.iter().map(|c| c.as_ref()).collect();
        let cells: Vec<Cell> = raw.iter().map(|r| Cell::parse(r)).collect();
        if cells.iter().all(Cell::is_missing) {
            continue;
        }
        kept.push((cells, raw));
    }

    if kept.is_empty() {
        return Err(AgriError::EmptyTable("no data rows".into()));
    }

    let dropped = grid.len() - kept.len();
    tracing::debug!(
        rows = kept.len(),
        columns = n_cols,
        dropped,
        "table transcribed"
    );

    let mut columns = Vec::with_capacity(n_cols);
    for (col_idx, name) in names.into_iter().enumerate() {
        let cells: Vec<Cell> = kept.iter().map(|(c, _)| c[col_idx].clone()).collect();
        let raw: Vec<&str> = kept.iter().map(|(_, r)| r[col_idx]).collect();
        columns.push((name, Column::from_cells(&cells, &raw)));
    }

    Table::from_columns(columns)
}

// ── Tests ─────────────────────────────────────────────────────────────
