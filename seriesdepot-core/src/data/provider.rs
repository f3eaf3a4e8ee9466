//! Market-data provider trait and structured fetch errors.
//!
//! The MarketDataProvider trait abstracts over remote sources so the loader
//! can be driven by Yahoo Finance in production and by a fake in tests.

use super::table::{TableError, TimeSeriesTable};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while fetching one dataset. Fatal to that dataset only.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} for {ticker}")]
    Http { ticker: String, status: u16 },

    #[error("ticker not found: {ticker}")]
    SymbolNotFound { ticker: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("CSV file not found: {}", .0.display())]
    CsvNotFound(PathBuf),

    #[error("CSV read error in {}: {reason}", .path.display())]
    CsvRead { path: PathBuf, reason: String },

    #[error("date column '{column}' not found in {}", .path.display())]
    MissingDateColumn { path: PathBuf, column: String },

    #[error("unparseable date '{value}' at line {line}")]
    InvalidDate { value: String, line: u64 },

    #[error("non-numeric value '{value}' in column '{column}' at line {line}")]
    InvalidNumber {
        column: String,
        value: String,
        line: u64,
    },

    #[error("table error: {0}")]
    Table(#[from] TableError),
}

/// Where a dataset's table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    Cache,
}

/// Trait for remote market-data providers.
///
/// Implementations return the provider's raw daily table (whatever columns
/// it offers). Field selection happens above this trait, and providers know
/// nothing about the cache.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily rows for a ticker. `start` is inclusive, `end` exclusive;
    /// `None` leaves that side unbounded. An empty table means "no data".
    fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, FetchError>;
}
