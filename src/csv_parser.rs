//! CSV loader for experimental data.
//!
//! Parses CSV text into headers and a grid of raw cell strings, then hands
//! them to [`build_table`](crate::dataframe::build_table), so CSV input and
//! manually entered grids go through the same cell classification.
//!
//! # Features
//!
//! - RFC 4180 compliant (quoted fields, escaped quotes, delimiters in fields)
//! - Byte-order mark and CRLF line endings
//! - Standard null markers recognized: `NA`, `N/A`, `null`, `NULL`, `None`, `.`, `#N/A`
//! - Configurable delimiter (`;` is common for comma-locale spreadsheets)
//!
//! # Example
//!
//! ```
//! use agristat::csv_parser::CsvParser;
//! use agristat::dataframe::DataType;
//!
//! let csv = "Variety;Yield\nAlpha;4,2\nBeta;NA\n";
//! let table = CsvParser::new().delimiter(b';').parse_str(csv).unwrap();
//! assert_eq!(table.row_count(), 2);
//! assert_eq!(table.column(1).unwrap().data_type(), DataType::Numeric);
//! assert_eq!(table.column(1).unwrap().null_count(), 1);
//! ```

use std::path::Path;

use crate::dataframe::{build_table, Table};
use crate::error::{AgriError, Result};

/// Standard null value markers recognized during parsing.
const DEFAULT_NULL_MARKERS: &[&str] = &[
    "NA", "N/A", "na", "n/a", "null", "NULL", "None", "none", ".", "NaN", "nan", "NAN",
    "#N/A", "#NA",
];

/// CSV parser configuration and entry point.
#[derive(Debug, Clone)]
pub struct CsvParser {
    delimiter: u8,
    null_markers: Vec<String>,
}

impl CsvParser {
    /// Creates a parser with a comma delimiter and the standard null markers.
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            null_markers: DEFAULT_NULL_MARKERS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Sets the field delimiter (default: comma).
    pub fn delimiter(mut self, delim: u8) -> Self {
        self.delimiter = delim;
        self
    }

    /// Sets custom null markers (replaces defaults).
    pub fn null_markers(mut self, markers: Vec<String>) -> Self {
        self.null_markers = markers;
        self
    }

    /// Parses a CSV string into a [`Table`]. The first row is the header.
    pub fn parse_str(&self, input: &str) -> Result<Table> {
        let (headers, grid) = self.parse_grid(input)?;
        build_table(&grid, &headers)
    }

    /// Reads and parses a CSV file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Table> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "reading csv");
        self.parse_str(&content)
    }

    /// Splits CSV text into headers and data rows with null markers blanked.
    ///
    /// Every data row must have exactly as many fields as the header. A
    /// ragged row is reported by the physical line it starts on, counting
    /// newlines inside quoted fields and skipped blank lines.
    pub fn parse_grid(&self, input: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        let mut records = self.parse_raw(input).into_iter();
        let headers = match records.next() {
            Some(header) => header.fields,
            None => return Err(AgriError::EmptyTable("no header row".into())),
        };

        let n_cols = headers.len();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            if record.fields.len() != n_cols {
                return Err(AgriError::CsvParse {
                    line: record.line,
                    message: format!("expected {n_cols} fields, got {}", record.fields.len()),
                });
            }
            let mut row = record.fields;
            for field in row.iter_mut() {
                if self.is_null(field) {
                    field.clear();
                }
            }
            rows.push(row);
        }
        Ok((headers, rows))
    }

    // ── Internal parsing ─────────────────────────────────────────

    /// Parses raw CSV text into records of string fields.
    fn parse_raw(&self, input: &str) -> Vec<RawRecord> {
        let delim = self.delimiter as char;
        let mut records: Vec<RawRecord> = Vec::new();
        let mut current_row: Vec<String> = Vec::new();
        let mut current_field = String::new();
        let mut in_quotes = false;
        let mut line = 1;
        let mut row_start = 1;
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if in_quotes {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        // Escaped quote ""
                        chars.next();
                        current_field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    if c == '\n' || (c == '\r' && chars.peek() != Some(&'\n')) {
                        line += 1;
                    }
                    current_field.push(c);
                }
            } else if c == '"' && current_field.is_empty() {
                in_quotes = true;
            } else if c == delim {
                current_row.push(std::mem::take(&mut current_field));
            } else if c == '\n' || c == '\r' {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                current_row.push(std::mem::take(&mut current_field));
                let fields = std::mem::take(&mut current_row);
                // Leading blank lines are skipped; later ones reach the
                // table builder, which drops fully-missing rows.
                if !records.is_empty() || !fields.iter().all(|f| f.is_empty()) {
                    records.push(RawRecord {
                        line: row_start,
                        fields,
                    });
                }
                line += 1;
                row_start = line;
            } else {
                current_field.push(c);
            }
        }

        if !current_field.is_empty() || !current_row.is_empty() {
            current_row.push(current_field);
            records.push(RawRecord {
                line: row_start,
                fields: current_row,
            });
        }

        // A blank line parses as a single empty field; drop those so that
        // trailing newlines do not trip the width check.
        records.retain(|r| !(r.fields.len() == 1 && r.fields[0].is_empty()));
        records
    }

    fn is_null(&self, value: &str) -> bool {
        let trimmed = value.trim();
        self.null_markers.iter().any(|m| m == trimmed)
    }
}

/// One parsed record and the 1-based line it starts on.
#[derive(Debug)]
struct RawRecord {
    line: usize,
    fields: Vec<String>,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}
