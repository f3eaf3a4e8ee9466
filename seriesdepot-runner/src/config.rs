//! Dataset configuration and loader settings.
//!
//! A configuration file has a top-level `datasets` list. Each entry is read
//! leniently and then validated into a `DatasetDescriptor`. An entry that
//! fails validation is kept as a rejected entry so the loader can report it
//! and carry on. Only problems with the file as a whole are `ConfigError`s.

use chrono::NaiveDate;
use serde::Deserialize;
use seriesdepot_core::data::cache::snapshot_key;
use seriesdepot_core::data::remote::default_remote_fields;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "datasets.yaml";
pub const DEFAULT_CACHE_DIR: &str = "cache";

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const DAY: Duration = Duration::from_secs(SECS_PER_DAY);

/// A whole number of days as a `Duration`, saturating on overflow.
pub fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(SECS_PER_DAY))
}

/// Errors that prevent any dataset from being processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("configuration file {} is empty or its 'datasets' key is missing", .0.display())]
    MissingDatasets(PathBuf),
}

/// Why a single configuration entry was rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DescriptorError {
    #[error("dataset entry has no 'name'")]
    MissingName,

    #[error("dataset '{name}' has no 'source_type'")]
    MissingSourceType { name: String },

    #[error("dataset '{name}' has unknown source_type '{kind}'")]
    UnknownSourceType { name: String, kind: String },

    #[error("dataset '{name}' has no 'identifier'")]
    MissingIdentifier { name: String },

    #[error("'date_column' not specified for CSV dataset '{name}'")]
    MissingDateColumn { name: String },

    #[error("dataset '{name}' has an invalid {field} '{value}' (expected YYYY-MM-DD)")]
    InvalidDate {
        name: String,
        field: &'static str,
        value: String,
    },

    #[error("dataset name '{0}' is used more than once")]
    DuplicateName(String),
}

/// Source kinds understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Yahoo Finance, spelled `yfinance` in configuration files.
    YFinance,
    Csv,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::YFinance => "yfinance",
            SourceKind::Csv => "csv",
        }
    }

    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "yfinance" => Some(SourceKind::YFinance),
            "csv" => Some(SourceKind::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote market-data series.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDescriptor {
    pub name: String,
    pub ticker: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub data_fields: Vec<String>,
}

/// A series read from a local CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub date_column: String,
    pub value_column: Option<String>,
    pub data_fields: Option<Vec<String>>,
}

/// One validated dataset to load.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetDescriptor {
    Remote(RemoteDescriptor),
    Csv(CsvDescriptor),
}

impl DatasetDescriptor {
    pub fn name(&self) -> &str {
        match self {
            DatasetDescriptor::Remote(r) => &r.name,
            DatasetDescriptor::Csv(c) => &c.name,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            DatasetDescriptor::Remote(_) => SourceKind::YFinance,
            DatasetDescriptor::Csv(_) => SourceKind::Csv,
        }
    }
}

/// A configuration entry: either a usable descriptor or the reason it was
/// rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEntry {
    Dataset(DatasetDescriptor),
    Rejected {
        name: Option<String>,
        error: DescriptorError,
    },
}

impl ConfigEntry {
    pub fn name(&self) -> Option<&str> {
        match self {
            ConfigEntry::Dataset(d) => Some(d.name()),
            ConfigEntry::Rejected { name, .. } => name.as_deref(),
        }
    }
}

/// Entry as written in the file, before validation.
#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    name: Option<String>,
    source_type: Option<String>,
    identifier: Option<String>,
    /// Dates stay loosely typed until validation: TOML has a native date
    /// type and YAML may yield numbers for malformed values.
    start_date: Option<toml::Value>,
    end_date: Option<toml::Value>,
    data_fields: Option<Vec<String>>,
    date_column: Option<String>,
    value_column: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    datasets: Option<Vec<RawDescriptor>>,
}

impl RawDescriptor {
    fn validate(self) -> Result<DatasetDescriptor, DescriptorError> {
        let name = non_empty(self.name).ok_or(DescriptorError::MissingName)?;

        let kind = non_empty(self.source_type).ok_or_else(|| {
            DescriptorError::MissingSourceType { name: name.clone() }
        })?;
        let kind = SourceKind::parse(&kind).ok_or_else(|| DescriptorError::UnknownSourceType {
            name: name.clone(),
            kind,
        })?;

        let identifier = non_empty(self.identifier)
            .ok_or_else(|| DescriptorError::MissingIdentifier { name: name.clone() })?;

        match kind {
            SourceKind::YFinance => Ok(DatasetDescriptor::Remote(RemoteDescriptor {
                start_date: parse_date(&name, "start_date", self.start_date)?,
                end_date: parse_date(&name, "end_date", self.end_date)?,
                data_fields: self.data_fields.unwrap_or_else(default_remote_fields),
                ticker: identifier,
                name,
            })),
            SourceKind::Csv => {
                let date_column = non_empty(self.date_column)
                    .ok_or_else(|| DescriptorError::MissingDateColumn { name: name.clone() })?;
                Ok(DatasetDescriptor::Csv(CsvDescriptor {
                    path: PathBuf::from(identifier),
                    date_column,
                    value_column: non_empty(self.value_column),
                    data_fields: self.data_fields,
                    name,
                }))
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_date(
    name: &str,
    field: &'static str,
    value: Option<toml::Value>,
) -> Result<Option<NaiveDate>, DescriptorError> {
    let invalid = |value: String| DescriptorError::InvalidDate {
        name: name.to_string(),
        field,
        value,
    };
    let raw = match value {
        None => return Ok(None),
        Some(toml::Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(toml::Value::String(s)) => s,
        Some(toml::Value::Datetime(dt)) => {
            return match dt.date {
                Some(d) => NaiveDate::from_ymd_opt(d.year.into(), d.month.into(), d.day.into())
                    .map(Some)
                    .ok_or_else(|| invalid(dt.to_string())),
                None => Err(invalid(dt.to_string())),
            };
        }
        Some(other) => return Err(invalid(other.to_string())),
    };
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|_| invalid(raw))
}

/// Parsed dataset configuration, entries in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConfig {
    entries: Vec<ConfigEntry>,
}

impl DatasetConfig {
    /// Load a configuration file. `.toml` files are parsed as TOML, anything
    /// else as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
        let file: Option<ConfigFile> = if is_toml {
            toml::from_str(&content).map_err(|e| parse_error(path, e))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| parse_error(path, e))?
        };

        let raw = file
            .and_then(|f| f.datasets)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ConfigError::MissingDatasets(path.to_path_buf()))?;

        Ok(Self::from_raw(raw))
    }

    /// Parse YAML text. Used by tests and callers that embed configuration.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let inline = PathBuf::from("<inline>");
        let file: Option<ConfigFile> =
            serde_yaml::from_str(content).map_err(|e| parse_error(&inline, e))?;
        let raw = file
            .and_then(|f| f.datasets)
            .filter(|d| !d.is_empty())
            .ok_or(ConfigError::MissingDatasets(inline))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: Vec<RawDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let entries = raw
            .into_iter()
            .map(|raw| {
                let name = non_empty(raw.name.clone());
                match raw.validate() {
                    // Names that normalize to the same key would share a snapshot.
                    Ok(descriptor) if !seen.insert(snapshot_key(descriptor.name())) => {
                        ConfigEntry::Rejected {
                            error: DescriptorError::DuplicateName(descriptor.name().to_string()),
                            name,
                        }
                    }
                    Ok(descriptor) => ConfigEntry::Dataset(descriptor),
                    Err(error) => ConfigEntry::Rejected { name, error },
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    /// Valid descriptors only, in file order.
    pub fn descriptors(&self) -> impl Iterator<Item = &DatasetDescriptor> {
        self.entries.iter().filter_map(|e| match e {
            ConfigEntry::Dataset(d) => Some(d),
            ConfigEntry::Rejected { .. } => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_error(path: &Path, e: impl fmt::Display) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Run-scoped settings passed to the loader at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    /// Directory holding one snapshot per dataset.
    pub cache_dir: PathBuf,
    /// Maximum snapshot age for remote market data.
    pub remote_expiry: Duration,
    /// Maximum snapshot age for CSV-backed datasets.
    pub csv_expiry: Duration,
    /// Skip the cache gate and refetch everything (snapshots are still
    /// written).
    pub refresh: bool,
}

impl LoaderSettings {
    pub fn expiry_for(&self, kind: SourceKind) -> Duration {
        match kind {
            SourceKind::YFinance => self.remote_expiry,
            SourceKind::Csv => self.csv_expiry,
        }
    }

    pub fn with_expiry_days(mut self, remote_days: u64, csv_days: u64) -> Self {
        self.remote_expiry = days(remote_days);
        self.csv_expiry = days(csv_days);
        self
    }
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            remote_expiry: DAY,
            csv_expiry: DAY * 30,
            refresh: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
datasets:
  - name: SPY
    source_type: yfinance
    identifier: SPY
    start_date: "2020-01-01"
  - name: RiskFreeRate
    source_type: csv
    identifier: data/risk_free.csv
    date_column: DATE
    value_column: DTB3
  - name: Mystery
    source_type: fred
    identifier: DGS10
"#;

    fn rejected(config: &DatasetConfig, index: usize) -> &DescriptorError {
        match &config.entries()[index] {
            ConfigEntry::Rejected { error, .. } => error,
            other => panic!("expected rejected entry, got {other:?}"),
        }
    }

    #[test]
    fn parses_descriptors_in_order() {
        let config = DatasetConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.len(), 3);

        let descriptors: Vec<_> = config.descriptors().collect();
        assert_eq!(descriptors.len(), 2);

        match descriptors[0] {
            DatasetDescriptor::Remote(r) => {
                assert_eq!(r.ticker, "SPY");
                assert_eq!(r.start_date, NaiveDate::from_ymd_opt(2020, 1, 1));
                assert_eq!(r.end_date, None);
                assert_eq!(r.data_fields, default_remote_fields());
            }
            other => panic!("expected remote, got {other:?}"),
        }
        match descriptors[1] {
            DatasetDescriptor::Csv(c) => {
                assert_eq!(c.path, PathBuf::from("data/risk_free.csv"));
                assert_eq!(c.date_column, "DATE");
                assert_eq!(c.value_column.as_deref(), Some("DTB3"));
                assert!(c.data_fields.is_none());
            }
            other => panic!("expected csv, got {other:?}"),
        }
    }

    #[test]
    fn unknown_source_type_is_rejected_not_fatal() {
        let config = DatasetConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(
            rejected(&config, 2),
            &DescriptorError::UnknownSourceType {
                name: "Mystery".into(),
                kind: "fred".into()
            }
        );
        assert_eq!(config.entries()[2].name(), Some("Mystery"));
    }

    #[test]
    fn csv_without_date_column_is_rejected() {
        let config = DatasetConfig::from_yaml_str(
            "datasets:\n  - {name: R, source_type: csv, identifier: r.csv}\n",
        )
        .unwrap();
        assert_eq!(
            rejected(&config, 0),
            &DescriptorError::MissingDateColumn { name: "R".into() }
        );
    }

    #[test]
    fn missing_fields_are_rejected() {
        let config = DatasetConfig::from_yaml_str(
            r#"
datasets:
  - source_type: csv
    identifier: r.csv
  - name: NoKind
    identifier: x
  - name: NoId
    source_type: yfinance
  - name: BadDate
    source_type: yfinance
    identifier: SPY
    end_date: "yesterday"
"#,
        )
        .unwrap();

        assert_eq!(rejected(&config, 0), &DescriptorError::MissingName);
        assert!(matches!(
            rejected(&config, 1),
            DescriptorError::MissingSourceType { .. }
        ));
        assert!(matches!(
            rejected(&config, 2),
            DescriptorError::MissingIdentifier { .. }
        ));
        assert!(matches!(
            rejected(&config, 3),
            DescriptorError::InvalidDate { field: "end_date", .. }
        ));
    }

    #[test]
    fn names_colliding_after_normalization_are_rejected() {
        let config = DatasetConfig::from_yaml_str(
            r#"
datasets:
  - {name: Risk Free, source_type: yfinance, identifier: A}
  - {name: risk_free, source_type: yfinance, identifier: B}
"#,
        )
        .unwrap();
        assert!(matches!(config.entries()[0], ConfigEntry::Dataset(_)));
        assert_eq!(
            rejected(&config, 1),
            &DescriptorError::DuplicateName("risk_free".into())
        );
    }

    #[test]
    fn missing_datasets_key_is_a_config_error() {
        assert!(matches!(
            DatasetConfig::from_yaml_str("other: 1\n"),
            Err(ConfigError::MissingDatasets(_))
        ));
        assert!(matches!(
            DatasetConfig::from_yaml_str(""),
            Err(ConfigError::MissingDatasets(_))
        ));
        assert!(matches!(
            DatasetConfig::from_yaml_str("datasets: []\n"),
            Err(ConfigError::MissingDatasets(_))
        ));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        assert!(matches!(
            DatasetConfig::from_yaml_str("datasets: [unclosed\n"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetConfig::load(&dir.path().join("datasets.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_reads_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets.toml");
        std::fs::write(
            &path,
            r#"
[[datasets]]
name = "QQQ"
source_type = "yfinance"
identifier = "QQQ"
data_fields = ["Close", "Adj Close"]
end_date = "2024-06-30"
"#,
        )
        .unwrap();

        let config = DatasetConfig::load(&path).unwrap();
        match config.descriptors().next() {
            Some(DatasetDescriptor::Remote(r)) => {
                assert_eq!(r.data_fields, vec!["Close", "Adj Close"]);
                assert_eq!(r.end_date, NaiveDate::from_ymd_opt(2024, 6, 30));
            }
            other => panic!("expected remote descriptor, got {other:?}"),
        };
    }

    #[test]
    fn native_toml_dates_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets.toml");
        std::fs::write(
            &path,
            r#"
[[datasets]]
name = "SPY"
source_type = "yfinance"
identifier = "SPY"
start_date = 2020-01-01
end_date = 2024-06-30T00:00:00Z

[[datasets]]
name = "Clock"
source_type = "yfinance"
identifier = "X"
start_date = 09:30:00
"#,
        )
        .unwrap();

        let config = DatasetConfig::load(&path).unwrap();
        match &config.entries()[0] {
            ConfigEntry::Dataset(DatasetDescriptor::Remote(r)) => {
                assert_eq!(r.start_date, NaiveDate::from_ymd_opt(2020, 1, 1));
                assert_eq!(r.end_date, NaiveDate::from_ymd_opt(2024, 6, 30));
            }
            other => panic!("expected remote descriptor, got {other:?}"),
        }
        assert!(matches!(
            rejected(&config, 1),
            DescriptorError::InvalidDate { field: "start_date", .. }
        ));
    }

    #[test]
    fn non_string_date_rejects_only_its_entry() {
        let config = DatasetConfig::from_yaml_str(
            r#"
datasets:
  - {name: A, source_type: yfinance, identifier: A, start_date: 20200101}
  - {name: B, source_type: yfinance, identifier: B, start_date: 2020-01-01}
"#,
        )
        .unwrap();

        assert_eq!(
            rejected(&config, 0),
            &DescriptorError::InvalidDate {
                name: "A".into(),
                field: "start_date",
                value: "20200101".into()
            }
        );
        assert!(matches!(config.entries()[1], ConfigEntry::Dataset(_)));
    }

    #[test]
    fn settings_pick_expiry_by_kind() {
        let settings = LoaderSettings::default();
        assert_eq!(settings.expiry_for(SourceKind::YFinance), DAY);
        assert_eq!(settings.expiry_for(SourceKind::Csv), DAY * 30);

        let custom = settings.with_expiry_days(2, 7);
        assert_eq!(custom.remote_expiry, DAY * 2);
        assert_eq!(custom.csv_expiry, DAY * 7);
    }

    #[test]
    fn huge_expiry_saturates_instead_of_wrapping() {
        let settings = LoaderSettings::default().with_expiry_days(1 << 32, u64::MAX);
        assert!(settings.remote_expiry > DAY * 365);
        assert_eq!(settings.csv_expiry, Duration::from_secs(u64::MAX));
    }
}
