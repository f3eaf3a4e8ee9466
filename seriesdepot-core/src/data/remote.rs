//! Remote fetch: provider call plus the requested-field policy.

use super::provider::{FetchError, MarketDataProvider};
use super::table::TimeSeriesTable;
use chrono::NaiveDate;
use tracing::{info, warn};

pub const ADJ_CLOSE: &str = "Adj Close";
pub const CLOSE: &str = "Close";

/// Fields requested when a remote descriptor names none.
pub const DEFAULT_REMOTE_FIELDS: [&str; 6] = ["Open", "High", "Low", "Close", "Adj Close", "Volume"];

pub fn default_remote_fields() -> Vec<String> {
    DEFAULT_REMOTE_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// Fetch a ticker and narrow it to the requested fields.
///
/// `Ok(None)` means the provider had no rows for the range.
pub fn fetch_remote(
    provider: &dyn MarketDataProvider,
    ticker: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    fields: &[String],
) -> Result<Option<TimeSeriesTable>, FetchError> {
    info!(
        ticker,
        provider = provider.name(),
        start = ?start,
        end = ?end,
        "fetching remote series"
    );
    let raw = provider.fetch(ticker, start, end)?;
    if raw.height() == 0 {
        warn!(ticker, "no data returned by {}", provider.name());
        return Ok(None);
    }
    Ok(Some(select_fields(ticker, raw, fields)))
}

/// Apply the field-availability policy to a raw provider table.
///
/// The provider already returns adjusted prices, so a requested but absent
/// `Adj Close` is filled in as a copy of `Close`. Anything else requested but
/// unavailable is dropped with a warning.
pub fn select_fields(ticker: &str, mut raw: TimeSeriesTable, fields: &[String]) -> TimeSeriesTable {
    if fields.iter().any(|f| f == ADJ_CLOSE) && !raw.has_column(ADJ_CLOSE) {
        raw.copy_column(CLOSE, ADJ_CLOSE);
    }

    let (table, missing) = raw.select(fields);
    if !missing.is_empty() {
        warn!(
            ticker,
            ?missing,
            "provider did not return all requested fields; 'Close' is already adjusted"
        );
    }
    table
}
