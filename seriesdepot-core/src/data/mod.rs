//! Data sources, the snapshot cache and the table type they share.

pub mod cache;
pub mod csv_import;
pub mod provider;
pub mod remote;
pub mod table;
pub mod yahoo;

pub use cache::{CacheError, CacheLookup, MissReason, SnapshotCache, SnapshotInfo};
pub use csv_import::{load_csv, CsvSelection};
pub use provider::{DataSource, FetchError, MarketDataProvider};
pub use remote::{default_remote_fields, fetch_remote};
pub use table::{TableColumn, TableError, TimeSeriesTable};
pub use yahoo::YahooProvider;
