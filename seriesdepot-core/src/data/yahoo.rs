//! Yahoo Finance data provider.
//!
//! Fetches daily OHLCV rows from Yahoo's v8 chart API. Prices are
//! back-adjusted with the `adjclose` series so `Close` is already the
//! adjusted close and no separate `Adj Close` column is returned.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; a shape mismatch surfaces as `FetchError::ResponseFormat`.

use super::provider::{FetchError, MarketDataProvider};
use super::table::TimeSeriesTable;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Column names produced by the provider, in order.
pub const YAHOO_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

/// 1900-01-01T00:00:00Z, used as `period1` when no start date is given.
const EARLIEST_TIMESTAMP: i64 = -2_208_988_800;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Build the chart API URL for a ticker and date range.
    fn chart_url(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<reqwest::Url, FetchError> {
        let period1 = start.map(midnight_ts).unwrap_or(EARLIEST_TIMESTAMP);
        let period2 = end.map(midnight_ts).unwrap_or_else(|| Utc::now().timestamp());

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FetchError::Provider(format!("invalid base URL '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Provider(format!("base URL '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);
        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", "1d")
            .append_pair("includeAdjustedClose", "true");
        Ok(url)
    }

    /// Parse the chart API response into a table.
    fn parse_response(ticker: &str, resp: ChartResponse) -> Result<TimeSeriesTable, FetchError> {
        let result = match resp.chart.result {
            Some(result) => result,
            None => {
                return Err(match resp.chart.error {
                    Some(err) => chart_error(ticker, err),
                    None => FetchError::ResponseFormat("empty result with no error".into()),
                })
            }
        };

        let Some(data) = result.into_iter().next() else {
            return Ok(empty_table());
        };

        // Yahoo omits timestamps entirely when the range holds no trading days.
        let Some(timestamps) = data.timestamp else {
            return Ok(empty_table());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormat("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut rows = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| FetchError::ResponseFormat(format!("invalid timestamp: {ts}")))?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // Skip rows where all OHLCV are None (holidays/non-trading days)
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            let adj_close = adj_closes
                .as_ref()
                .and_then(|v| v.get(i).copied().flatten());
            let ratio = match (adj_close, close) {
                (Some(adj), Some(c)) if c != 0.0 => adj / c,
                _ => 1.0,
            };
            let adjusted = |v: Option<f64>| v.map_or(f64::NAN, |p| p * ratio);

            rows.push((
                date,
                vec![
                    adjusted(open),
                    adjusted(high),
                    adjusted(low),
                    adjusted(close),
                    volume.unwrap_or(f64::NAN),
                ],
            ));
        }

        let (table, dropped) = TimeSeriesTable::from_rows(column_names(), rows)?;
        if dropped > 0 {
            warn!(ticker, dropped, "provider returned duplicate dates, kept the first row of each");
        }
        Ok(table)
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, FetchError> {
        let url = self.chart_url(ticker, start, end)?;
        debug!(%url, "requesting chart data");

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            // Unknown tickers come back as 404 with a chart error body.
            let body: Option<ChartResponse> = resp.json().ok();
            if let Some(err) = body.and_then(|b| b.chart.error) {
                return Err(chart_error(ticker, err));
            }
            return Err(FetchError::Http {
                ticker: ticker.to_string(),
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            FetchError::ResponseFormat(format!("failed to parse response for {ticker}: {e}"))
        })?;

        Self::parse_response(ticker, chart)
    }
}

fn midnight_ts(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn column_names() -> Vec<String> {
    YAHOO_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn empty_table() -> TimeSeriesTable {
    TimeSeriesTable::empty(column_names())
}

fn chart_error(ticker: &str, err: ChartError) -> FetchError {
    if err.code == "Not Found" {
        FetchError::SymbolNotFound {
            ticker: ticker.to_string(),
        }
    } else {
        FetchError::Provider(format!("{}: {}", err.code, err.description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<TimeSeriesTable, FetchError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        YahooProvider::parse_response("SPY", resp)
    }

    // 2024-01-02, 2024-01-03, 2024-01-04 at 14:30 UTC
    const BODY: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{
                        "open":   [100.0, null, 102.0],
                        "high":   [110.0, null, 104.0],
                        "low":    [90.0,  null, 101.0],
                        "close":  [100.0, null, 103.0],
                        "volume": [1000,  null, 1200]
                    }],
                    "adjclose": [{ "adjclose": [50.0, null, 103.0] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_and_adjusts_prices() {
        let table = parse(BODY).unwrap();

        assert_eq!(table.column_names(), YAHOO_COLUMNS.to_vec());
        assert_eq!(table.height(), 2, "null-only day is skipped");
        assert_eq!(
            table.index(),
            &[
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
            ]
        );

        // adjclose/close = 0.5 on the first day
        assert_eq!(table.column("Open").unwrap()[0], 50.0);
        assert_eq!(table.column("High").unwrap()[0], 55.0);
        assert_eq!(table.column("Close").unwrap()[0], 50.0);
        assert_eq!(table.column("Volume").unwrap()[0], 1000.0);
        assert_eq!(table.column("Close").unwrap()[1], 103.0);
        assert!(!table.has_column("Adj Close"));
    }

    #[test]
    fn not_found_maps_to_symbol_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(
            parse(body),
            Err(FetchError::SymbolNotFound { ticker }) if ticker == "SPY"
        ));
    }

    #[test]
    fn other_chart_error_maps_to_provider() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        let err = parse(body).unwrap_err();
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn missing_timestamps_is_no_data() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        let table = parse(body).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn chart_url_carries_ticker_and_range() {
        let provider = YahooProvider::with_base_url("https://example.test/").unwrap();
        let url = provider
            .chart_url(
                "SPY",
                NaiveDate::from_ymd_opt(2024, 1, 2),
                NaiveDate::from_ymd_opt(2024, 1, 3),
            )
            .unwrap();

        assert_eq!(url.path(), "/v8/finance/chart/SPY");
        let query = url.query().unwrap();
        assert!(query.contains("period1=1704153600"));
        assert!(query.contains("period2=1704240000"));
        assert!(query.contains("interval=1d"));
    }

    #[test]
    fn chart_url_without_start_reaches_back_to_1900() {
        let provider = YahooProvider::new().unwrap();
        let url = provider.chart_url("SPY", None, None).unwrap();
        assert!(url.query().unwrap().contains("period1=-2208988800"));
    }
}
