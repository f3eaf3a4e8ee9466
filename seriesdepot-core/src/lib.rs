//! SeriesDepot Core: time series table, snapshot cache and data sources.
//!
//! This crate contains everything that touches data:
//! - `TimeSeriesTable`, a date-indexed table of numeric columns
//! - Parquet snapshot cache keyed by dataset name, aged by file mtime
//! - `MarketDataProvider` trait and the Yahoo Finance implementation
//! - Remote field policy (`Adj Close` synthesis, partial field sets)
//! - CSV import with the `.` missing-value sentinel

pub mod data;

pub use data::{
    CacheError, CacheLookup, DataSource, FetchError, MarketDataProvider, MissReason,
    SnapshotCache, TableColumn, TableError, TimeSeriesTable, YahooProvider,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types handed across crate boundaries are
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<TimeSeriesTable>();
        require_sync::<TimeSeriesTable>();
        require_send::<SnapshotCache>();
        require_sync::<SnapshotCache>();
        require_send::<YahooProvider>();
        require_sync::<YahooProvider>();
        require_send::<FetchError>();
        require_sync::<FetchError>();
    }

    /// MarketDataProvider must stay object safe; the loader holds it as
    /// `&dyn MarketDataProvider`.
    #[test]
    fn provider_trait_is_object_safe() {
        fn _takes_dyn(provider: &dyn MarketDataProvider) -> &str {
            provider.name()
        }
    }
}
