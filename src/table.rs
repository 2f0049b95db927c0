//! Delimiter-sniffing CSV table I/O.
//!
//! Input files arrive with either `;` or `,` as the field delimiter
//! (both are common in exported spreadsheets); the reader sniffs the
//! header line instead of asking the submitter. Output is always
//! comma-delimited UTF-8 with the three geocoding columns appended.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::JobError;

/// Rows with named columns, positionally aligned to the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of the column with the given header, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// The values of one column in row order. Rows shorter than the
    /// header (ragged input) contribute an empty string.
    #[must_use]
    pub fn column_values(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or_default())
            .collect()
    }

    /// Append a new column, row-aligned by position.
    ///
    /// # Panics
    /// Panics if `values` is not length-matched to the table; the batch
    /// scheduler guarantees this before results ever reach a table.
    pub fn push_column(&mut self, header: &str, values: Vec<String>) {
        assert_eq!(
            values.len(),
            self.rows.len(),
            "column {header:?} must match the table's row count"
        );
        self.headers.push(header.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }
}

/// Pick the more plausible delimiter by counting candidates in the
/// header line. Semicolon wins ties because comma-decimal locales
/// frequently embed commas inside quoted values.
fn sniff_delimiter(header_line: &str) -> u8 {
    let semicolons = header_line.matches(';').count();
    let commas = header_line.matches(',').count();
    if semicolons >= commas && semicolons > 0 {
        b';'
    } else {
        b','
    }
}

/// Read a table from disk, auto-detecting the delimiter.
///
/// # Errors
/// Returns [`JobError::InvalidInput`] if the file cannot be read or the
/// CSV structure cannot be parsed.
pub fn read_table(path: &Path) -> Result<Table, JobError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| JobError::InvalidInput(format!("{}: {e}", path.display())))?;

    let header_line = raw.lines().next().unwrap_or_default();
    let delimiter = sniff_delimiter(header_line);
    debug!(
        path = %path.display(),
        delimiter = %(delimiter as char),
        "reading input table"
    );

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| JobError::InvalidInput(e.to_string()))?
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let width = headers.len();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| JobError::InvalidInput(e.to_string()))?;
        let mut row: Vec<String> = record.iter().map(ToString::to_string).collect();
        // Pad ragged rows to header width so appended columns stay
        // aligned and the non-flexible writer accepts every record.
        if row.len() < width {
            row.resize(width, String::new());
        }
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

/// Resolve the index of a required column, failing with the list of
/// columns the table actually has.
///
/// # Errors
/// Returns [`JobError::MissingColumn`] when absent.
pub fn require_column(table: &Table, name: &str) -> Result<usize, JobError> {
    table
        .column_index(name)
        .ok_or_else(|| JobError::MissingColumn {
            column: name.to_string(),
            available: table.headers().to_vec(),
        })
}

/// Write a table as comma-delimited UTF-8.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create output table {}", path.display()))?;

    writer
        .write_record(table.headers())
        .context("failed to write table header")?;
    for row in table.rows() {
        writer.write_record(row).context("failed to write table row")?;
    }
    writer.flush().context("failed to flush output table")?;

    Ok(())
}
