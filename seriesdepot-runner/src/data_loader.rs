//! Dataset loading for a configured collection.
//!
//! For every configured entry the loader:
//! 1. Skips entries rejected while reading the configuration
//! 2. Uses a fresh snapshot from the cache when one exists
//! 3. Otherwise fetches from the remote provider or reads the CSV file
//! 4. Writes the result through to the cache
//!
//! A failure in any one dataset is logged and recorded in the report; the
//! rest of the run carries on. Only a configuration that cannot be read stops
//! the run.

use crate::config::{
    ConfigEntry, ConfigError, DatasetConfig, DatasetDescriptor, DescriptorError, LoaderSettings,
};
use crate::progress::LoadProgress;
use seriesdepot_core::data::{
    fetch_remote, load_csv, CacheLookup, CsvSelection, DataSource, FetchError,
    MarketDataProvider, SnapshotCache, TimeSeriesTable,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

/// Successfully loaded tables keyed by dataset name. Use
/// `LoadReport::tables` for configuration order.
pub type Collection = BTreeMap<String, TimeSeriesTable>;

/// Why a dataset is missing from the collection.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] DescriptorError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no data returned")]
    Empty,
}

/// How a single dataset was resolved.
#[derive(Debug)]
pub enum DatasetStatus {
    FromCache,
    /// Freshly fetched. `cached` is false when the snapshot could not be
    /// written.
    Fetched { source: DataSource, cached: bool },
    Skipped(SkipReason),
}

#[derive(Debug)]
pub struct DatasetOutcome {
    pub name: String,
    pub status: DatasetStatus,
}

impl DatasetOutcome {
    pub fn is_loaded(&self) -> bool {
        !matches!(self.status, DatasetStatus::Skipped(_))
    }
}

/// Result of a load run.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub collection: Collection,
    /// One outcome per configured entry, in configuration order.
    pub outcomes: Vec<DatasetOutcome>,
}

impl LoadReport {
    pub fn configured(&self) -> usize {
        self.outcomes.len()
    }

    pub fn loaded(&self) -> usize {
        self.collection.len()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &DatasetOutcome> {
        self.outcomes.iter().filter(|o| !o.is_loaded())
    }

    /// Loaded tables in configuration order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TimeSeriesTable)> {
        self.outcomes
            .iter()
            .filter(|o| o.is_loaded())
            .filter_map(move |o| self.collection.get(&o.name).map(|t| (o.name.as_str(), t)))
    }

    /// Human-readable summary: the loaded count followed by one line per table.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Successfully loaded {} out of {} datasets",
            self.loaded(),
            self.configured()
        )];
        for (name, table) in self.tables() {
            let range = match (table.first_date(), table.last_date()) {
                (Some(first), Some(last)) => format!("{first} to {last}"),
                _ => "no rows".to_string(),
            };
            lines.push(format!(
                "  {name}: {} rows, {} columns, {range}",
                table.height(),
                table.width()
            ));
        }
        lines
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.summary_lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Loads configured datasets through the snapshot cache.
pub struct DatasetLoader<'a> {
    settings: LoaderSettings,
    cache: SnapshotCache,
    provider: &'a dyn MarketDataProvider,
    progress: Option<&'a dyn LoadProgress>,
}

impl<'a> DatasetLoader<'a> {
    pub fn new(settings: LoaderSettings, provider: &'a dyn MarketDataProvider) -> Self {
        let cache = SnapshotCache::new(&settings.cache_dir);
        Self {
            settings,
            cache,
            provider,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn LoadProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Process every entry in order and collect the results.
    pub fn load_entries(&self, entries: &[ConfigEntry]) -> LoadReport {
        let total = entries.len();
        let mut report = LoadReport::default();

        for (i, entry) in entries.iter().enumerate() {
            let name = entry
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("<entry {}>", i + 1));

            let (status, table) = match entry {
                ConfigEntry::Dataset(descriptor) => {
                    if let Some(p) = self.progress {
                        p.on_start(&name, Some(descriptor.kind()), i, total);
                    }
                    match self.load_dataset(descriptor) {
                        Ok((table, status)) => (status, Some(table)),
                        Err(reason) => (DatasetStatus::Skipped(reason), None),
                    }
                }
                ConfigEntry::Rejected { error, .. } => {
                    if let Some(p) = self.progress {
                        p.on_start(&name, None, i, total);
                    }
                    (DatasetStatus::Skipped(SkipReason::Invalid(error.clone())), None)
                }
            };

            if let DatasetStatus::Skipped(reason) = &status {
                warn!(dataset = %name, %reason, "skipping dataset");
            }

            let outcome = DatasetOutcome { name, status };
            if let Some(p) = self.progress {
                p.on_complete(&outcome, table.as_ref());
            }
            if let Some(table) = table {
                report.collection.insert(outcome.name.clone(), table);
            }
            report.outcomes.push(outcome);
        }

        info!(
            loaded = report.loaded(),
            configured = report.configured(),
            "load run complete"
        );
        if let Some(p) = self.progress {
            p.on_batch_complete(&report);
        }
        report
    }

    /// Resolve one dataset from the cache or its source.
    pub fn load_dataset(
        &self,
        descriptor: &DatasetDescriptor,
    ) -> Result<(TimeSeriesTable, DatasetStatus), SkipReason> {
        let name = descriptor.name();

        if !self.settings.refresh {
            let max_age = self.settings.expiry_for(descriptor.kind());
            let source_file = match descriptor {
                DatasetDescriptor::Csv(csv) => Some(csv.path.as_path()),
                DatasetDescriptor::Remote(_) => None,
            };
            if let CacheLookup::Hit(table) = self.cache.lookup(name, max_age, source_file) {
                return Ok((table, DatasetStatus::FromCache));
            }
        }

        let (fetched, source) = match descriptor {
            DatasetDescriptor::Remote(remote) => (
                fetch_remote(
                    self.provider,
                    &remote.ticker,
                    remote.start_date,
                    remote.end_date,
                    &remote.data_fields,
                )?,
                DataSource::YahooFinance,
            ),
            DatasetDescriptor::Csv(csv) => {
                let selection = CsvSelection {
                    data_fields: csv.data_fields.as_deref(),
                    value_column: csv.value_column.as_deref(),
                };
                (
                    Some(load_csv(&csv.path, &csv.date_column, &selection)?),
                    DataSource::CsvImport,
                )
            }
        };

        let table = fetched
            .filter(|t| !t.is_empty())
            .ok_or(SkipReason::Empty)?;

        let cached = match self.cache.write(name, &table) {
            Ok(_) => true,
            Err(e) => {
                warn!(dataset = name, error = %e, "could not write snapshot");
                false
            }
        };

        Ok((table, DatasetStatus::Fetched { source, cached }))
    }
}

/// Read the configuration at `config_path` and load every dataset it lists.
///
/// Only a configuration failure is returned as an error. Per-dataset failures
/// are recorded in the report.
pub fn load_all_data(
    config_path: &Path,
    loader: &DatasetLoader<'_>,
) -> Result<LoadReport, ConfigError> {
    let config = DatasetConfig::load(config_path).map_err(|e| {
        error!(error = %e, "could not load dataset configurations");
        e
    })?;
    info!(
        path = %config_path.display(),
        entries = config.len(),
        "configuration loaded"
    );
    Ok(loader.load_entries(config.entries()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use seriesdepot_core::data::TableColumn;

    fn table(rows: usize) -> TimeSeriesTable {
        let index = (0..rows)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 2 + i as u32).unwrap())
            .collect();
        TimeSeriesTable::new(
            index,
            vec![TableColumn::new("Close", (0..rows).map(|i| i as f64).collect())],
        )
        .unwrap()
    }

    #[test]
    fn summary_counts_loaded_against_configured() {
        let mut report = LoadReport::default();
        report.collection.insert("SPY".into(), table(3));
        report.outcomes.push(DatasetOutcome {
            name: "SPY".into(),
            status: DatasetStatus::FromCache,
        });
        report.outcomes.push(DatasetOutcome {
            name: "Broken".into(),
            status: DatasetStatus::Skipped(SkipReason::Empty),
        });

        let lines = report.summary_lines();
        assert_eq!(lines[0], "Successfully loaded 1 out of 2 datasets");
        assert_eq!(lines[1], "  SPY: 3 rows, 1 columns, 2024-01-02 to 2024-01-04");
        assert_eq!(report.skipped().count(), 1);
    }

    #[test]
    fn summary_follows_configuration_order() {
        let mut report = LoadReport::default();
        for name in ["Zeta", "Alpha", "Mid"] {
            report.collection.insert(name.into(), table(1));
            report.outcomes.push(DatasetOutcome {
                name: name.into(),
                status: DatasetStatus::FromCache,
            });
        }

        let names: Vec<_> = report.tables().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);

        let lines = report.summary_lines();
        assert!(lines[1].starts_with("  Zeta:"));
        assert!(lines[3].starts_with("  Mid:"));
    }

    #[test]
    fn skip_reason_messages_name_the_cause() {
        let reason = SkipReason::from(DescriptorError::MissingDateColumn {
            name: "RiskFreeRate".into(),
        });
        assert_eq!(
            reason.to_string(),
            "invalid configuration: 'date_column' not specified for CSV dataset 'RiskFreeRate'"
        );
    }
}
