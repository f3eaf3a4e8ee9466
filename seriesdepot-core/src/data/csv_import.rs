//! CSV import for locally maintained series.
//!
//! Expected shape: a header row, one date column and one or more numeric
//! value columns. A literal `.` (the FRED convention) or an empty cell is a
//! missing value and becomes NaN.

use super::provider::FetchError;
use super::table::TimeSeriesTable;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::path::Path;
use tracing::{info, warn};

/// Literal that stands in for a missing value.
pub const MISSING_SENTINEL: &str = ".";

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Which columns of a CSV file to keep.
#[derive(Debug, Clone, Default)]
pub struct CsvSelection<'a> {
    /// Explicit field list; takes precedence over `value_column`.
    pub data_fields: Option<&'a [String]>,
    /// Single value column for simple series.
    pub value_column: Option<&'a str>,
}

/// Load a CSV file into a table indexed by `date_column`.
pub fn load_csv(
    path: &Path,
    date_column: &str,
    selection: &CsvSelection<'_>,
) -> Result<TimeSeriesTable, FetchError> {
    info!(
        path = %path.display(),
        date_column,
        value_column = ?selection.value_column,
        "loading CSV"
    );

    if !path.exists() {
        return Err(FetchError::CsvNotFound(path.to_path_buf()));
    }

    let read_err = |e: csv::Error| FetchError::CsvRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(read_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(read_err)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let date_idx = headers
        .iter()
        .position(|h| h == date_column)
        .ok_or_else(|| FetchError::MissingDateColumn {
            path: path.to_path_buf(),
            column: date_column.to_string(),
        })?;

    let value_columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let selected = resolve_selection(path, &value_columns, selection);
    let selected_idx: Vec<usize> = selected
        .iter()
        .filter_map(|name| headers.iter().position(|h| h == name))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_err)?;
        let line = record.position().map_or(0, |p| p.line());

        let raw_date = record.get(date_idx).unwrap_or_default();
        let date = parse_date(raw_date).ok_or_else(|| FetchError::InvalidDate {
            value: raw_date.to_string(),
            line,
        })?;

        let mut values = Vec::with_capacity(selected_idx.len());
        for (&idx, name) in selected_idx.iter().zip(&selected) {
            let cell = record.get(idx).unwrap_or_default();
            let value = parse_value(cell).ok_or_else(|| FetchError::InvalidNumber {
                column: name.clone(),
                value: cell.to_string(),
                line,
            })?;
            values.push(value);
        }
        rows.push((date, values));
    }

    let (table, dropped) = TimeSeriesTable::from_rows(selected, rows)?;
    if dropped > 0 {
        warn!(
            path = %path.display(),
            dropped,
            "duplicate dates in CSV, kept the first row of each"
        );
    }
    Ok(table)
}

/// Decide which value columns to keep.
///
/// Explicit fields win when any of them exist, then the value column, then
/// every non-date column.
fn resolve_selection(
    path: &Path,
    available: &[String],
    selection: &CsvSelection<'_>,
) -> Vec<String> {
    if let Some(fields) = selection.data_fields.filter(|f| !f.is_empty()) {
        let requested = unique_names(path, fields, "data_fields");
        let present: Vec<String> = requested
            .iter()
            .filter(|f| available.contains(f))
            .cloned()
            .collect();
        if present.len() < requested.len() {
            warn!(
                path = %path.display(),
                requested = ?fields,
                ?available,
                "not all requested data_fields found in CSV"
            );
        }
        if !present.is_empty() {
            return present;
        }
    }
    if let Some(value_column) = selection.value_column {
        if available.iter().any(|c| c == value_column) {
            return vec![value_column.to_string()];
        }
    }

    warn!(
        path = %path.display(),
        value_column = ?selection.value_column,
        "value_column not found and no usable data_fields; returning all columns"
    );
    unique_names(path, available, "header")
}

/// Drop repeated names, keeping the first occurrence of each.
fn unique_names(path: &Path, names: &[String], source: &str) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if unique.contains(name) {
            warn!(path = %path.display(), column = %name, source, "repeated column name ignored");
        } else {
            unique.push(name.clone());
        }
    }
    unique
}

/// Parse a date cell in any of the accepted formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Parse a value cell; the sentinel and empty cells are NaN.
pub fn parse_value(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == MISSING_SENTINEL {
        return Some(f64::NAN);
    }
    raw.parse::<f64>().ok()
}
