//! Date-indexed table of named numeric columns.
//!
//! Every fetcher produces one of these and the snapshot cache stores one per
//! dataset. The index is strictly ascending (which also makes it unique);
//! missing values are `f64::NAN`.

use chrono::NaiveDate;
use thiserror::Error;

/// Violations of the table invariants.
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("column '{column}' has {actual} values but the index has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("index is not strictly ascending at row {row} ({date})")]
    UnsortedIndex { row: usize, date: NaiveDate },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("row {row} has {actual} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// A single named value column.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub values: Vec<f64>,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Date-indexed ordered table of `f64` columns.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    index: Vec<NaiveDate>,
    columns: Vec<TableColumn>,
}

impl TimeSeriesTable {
    /// Build a table, checking that the index is strictly ascending, every
    /// column matches the index length and column names are unique.
    pub fn new(index: Vec<NaiveDate>, columns: Vec<TableColumn>) -> Result<Self, TableError> {
        if let Some(row) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(TableError::UnsortedIndex {
                row: row + 1,
                date: index[row + 1],
            });
        }
        for (i, col) in columns.iter().enumerate() {
            if col.values.len() != index.len() {
                return Err(TableError::LengthMismatch {
                    column: col.name.clone(),
                    expected: index.len(),
                    actual: col.values.len(),
                });
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { index, columns })
    }

    /// A table with the given columns and no rows.
    pub fn empty(names: Vec<String>) -> Self {
        Self {
            index: Vec::new(),
            columns: names
                .into_iter()
                .map(|name| TableColumn::new(name, Vec::new()))
                .collect(),
        }
    }

    /// Build a table from rows in arbitrary order.
    ///
    /// Rows are stably sorted by date and only the first row for each date
    /// is kept. Returns the table and the number of dropped duplicate rows.
    pub fn from_rows(
        names: Vec<String>,
        mut rows: Vec<(NaiveDate, Vec<f64>)>,
    ) -> Result<(Self, usize), TableError> {
        if let Some((row, (_, values))) = rows
            .iter()
            .enumerate()
            .find(|(_, (_, values))| values.len() != names.len())
        {
            return Err(TableError::RowWidth {
                row,
                expected: names.len(),
                actual: values.len(),
            });
        }

        rows.sort_by_key(|(date, _)| *date);
        let before = rows.len();
        rows.dedup_by_key(|(date, _)| *date);
        let dropped = before - rows.len();

        let mut columns: Vec<TableColumn> = names
            .into_iter()
            .map(|name| TableColumn::new(name, Vec::with_capacity(rows.len())))
            .collect();
        let mut index = Vec::with_capacity(rows.len());
        for (date, values) in rows {
            index.push(date);
            for (col, v) in columns.iter_mut().zip(values) {
                col.values.push(v);
            }
        }

        Ok((Self::new(index, columns)?, dropped))
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.index.len()
    }

    /// Number of value columns (the index is not counted).
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// A table with no rows or no value columns holds no data.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.index.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.index.last().copied()
    }

    /// Append a column copied from an existing one.
    ///
    /// Does nothing and returns `false` if `source` is absent or `name` is
    /// already taken.
    pub fn copy_column(&mut self, source: &str, name: &str) -> bool {
        if self.has_column(name) {
            return false;
        }
        match self.column(source) {
            Some(values) => {
                let copy = TableColumn::new(name, values.to_vec());
                self.columns.push(copy);
                true
            }
            None => false,
        }
    }

    /// Keep only the named columns, in the requested order.
    ///
    /// Returns the narrowed table and the requested names that were absent.
    pub fn select(mut self, names: &[String]) -> (Self, Vec<String>) {
        let mut selected = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            if selected.iter().any(|c: &TableColumn| &c.name == name) {
                continue;
            }
            match self.columns.iter().position(|c| &c.name == name) {
                Some(pos) => selected.push(self.columns.swap_remove(pos)),
                None => missing.push(name.clone()),
            }
        }
        self.columns = selected;
        (self, missing)
    }

    /// Rows `0..n` as `(date, values)` pairs, for previews.
    pub fn head(&self, n: usize) -> Vec<(NaiveDate, Vec<f64>)> {
        self.index
            .iter()
            .take(n)
            .enumerate()
            .map(|(row, date)| (*date, self.columns.iter().map(|c| c.values[row]).collect()))
            .collect()
    }
}

/// Equality treats NaN cells as equal to each other so snapshots compare
/// equal to the table they were written from.
impl PartialEq for TimeSeriesTable {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.columns.len() == other.columns.len()
            && self.columns.iter().zip(&other.columns).all(|(a, b)| {
                a.name == b.name
                    && a.values.len() == b.values.len()
                    && a
                        .values
                        .iter()
                        .zip(&b.values)
                        .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
            })
    }
}
