//! Parquet snapshot cache.
//!
//! Layout: `{cache_dir}/{normalized_name}.parquet`, one file per dataset.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - The file's modification time is the snapshot's age; nothing else is
//!   stored about freshness
//! - A snapshot that cannot be read is reported as a miss, never an error

use super::table::{TableColumn, TimeSeriesTable};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the index column inside snapshot files.
pub const DATE_COLUMN: &str = "Date";

const EXTENSION: &str = "parquet";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache read error: {0}")]
    Read(String),

    #[error("cache write error: {0}")]
    Write(String),
}

/// Why a lookup did not produce a table.
#[derive(Debug, Clone, PartialEq)]
pub enum MissReason {
    /// No snapshot file for this dataset.
    Absent,
    /// Snapshot is at least as old as the allowed age.
    Expired { age: Duration },
    /// The source file was modified after the snapshot was written.
    SourceNewer,
    /// Snapshot exists but could not be deserialized.
    Unreadable(String),
}

/// Outcome of a cache lookup.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(TimeSeriesTable),
    Miss(MissReason),
}

/// A snapshot file found in the cache directory.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// File stem, i.e. the normalized dataset name.
    pub key: String,
    pub path: PathBuf,
    pub age: Duration,
    pub size_bytes: u64,
}

/// The snapshot cache.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    cache_dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the snapshot for a dataset: `{cache_dir}/{key}.parquet`
    pub fn snapshot_path(&self, dataset_name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{EXTENSION}", snapshot_key(dataset_name)))
    }

    /// Return the cached table if its snapshot is younger than `max_age`.
    ///
    /// When `source` is given, a snapshot older than that file's
    /// modification time is also a miss. If the source's metadata cannot be
    /// read the age check alone decides.
    pub fn lookup(
        &self,
        dataset_name: &str,
        max_age: Duration,
        source: Option<&Path>,
    ) -> CacheLookup {
        let path = self.snapshot_path(dataset_name);
        let Ok(modified) = modified_time(&path) else {
            debug!(dataset = dataset_name, "no snapshot");
            return CacheLookup::Miss(MissReason::Absent);
        };

        let age = age_of(modified);
        if age >= max_age {
            info!(
                dataset = dataset_name,
                age_secs = age.as_secs(),
                "snapshot expired, will refetch"
            );
            return CacheLookup::Miss(MissReason::Expired { age });
        }

        if let Some(source) = source {
            if let Ok(source_modified) = modified_time(source) {
                if source_modified > modified {
                    info!(
                        dataset = dataset_name,
                        source = %source.display(),
                        "source file changed since snapshot, will reload"
                    );
                    return CacheLookup::Miss(MissReason::SourceNewer);
                }
            }
        }

        match read_snapshot(&path) {
            Ok(table) => {
                info!(dataset = dataset_name, path = %path.display(), "loaded from cache");
                CacheLookup::Hit(table)
            }
            Err(e) => {
                warn!(
                    dataset = dataset_name,
                    path = %path.display(),
                    error = %e,
                    "could not read snapshot, will refetch"
                );
                CacheLookup::Miss(MissReason::Unreadable(e.to_string()))
            }
        }
    }

    /// Write a dataset's table to the cache, replacing any previous snapshot.
    ///
    /// Writes are atomic: write to .tmp then rename.
    pub fn write(
        &self,
        dataset_name: &str,
        table: &TimeSeriesTable,
    ) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| CacheError::Write(format!("failed to create dir: {e}")))?;

        let path = self.snapshot_path(dataset_name);
        let tmp_path = path.with_extension(format!("{EXTENSION}.tmp"));

        let mut df = table_to_dataframe(table)?;
        write_parquet(&mut df, &tmp_path)?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            CacheError::Write(format!("atomic rename failed: {e}"))
        })?;

        info!(dataset = dataset_name, path = %path.display(), "saved to cache");
        Ok(path)
    }

    /// List snapshot files in the cache directory, sorted by key.
    pub fn entries(&self) -> Result<Vec<SnapshotInfo>, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }

        let dir = fs::read_dir(&self.cache_dir)
            .map_err(|e| CacheError::Read(format!("read dir: {e}")))?;

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| CacheError::Read(format!("dir entry: {e}")))?;
            let path = entry.path();

            // Skip non-parquet files (.tmp leftovers etc)
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let meta = entry
                .metadata()
                .map_err(|e| CacheError::Read(format!("metadata for {}: {e}", path.display())))?;
            let modified = meta
                .modified()
                .map_err(|e| CacheError::Read(format!("mtime for {}: {e}", path.display())))?;

            entries.push(SnapshotInfo {
                key,
                path,
                age: age_of(modified),
                size_bytes: meta.len(),
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

/// Normalized file stem for a dataset name: lower-cased, spaces to `_`.
pub fn snapshot_key(dataset_name: &str) -> String {
    dataset_name.replace(' ', "_").to_lowercase()
}

/// Read a snapshot file regardless of its age.
pub fn read_snapshot(path: &Path) -> Result<TimeSeriesTable, CacheError> {
    let file = fs::File::open(path).map_err(|e| CacheError::Read(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CacheError::Read(format!("read parquet: {e}")))?;
    dataframe_to_table(&df)
}

fn modified_time(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Wall-clock age; a timestamp in the future counts as zero.
fn age_of(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}

fn epoch() -> NaiveDate {
    chrono::DateTime::<chrono::Utc>::UNIX_EPOCH.date_naive()
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Convert a table to a Polars DataFrame with a leading `Date` column.
fn table_to_dataframe(table: &TimeSeriesTable) -> Result<DataFrame, CacheError> {
    let days: Vec<i32> = table
        .index()
        .iter()
        .map(|d| (*d - epoch()).num_days() as i32)
        .collect();

    let mut columns = Vec::with_capacity(table.width() + 1);
    columns.push(
        Column::new(DATE_COLUMN.into(), days)
            .cast(&DataType::Date)
            .map_err(|e| CacheError::Write(format!("date cast: {e}")))?,
    );
    for col in table.columns() {
        columns.push(Column::new(col.name.as_str().into(), col.values.clone()));
    }

    DataFrame::new(columns).map_err(|e| CacheError::Write(format!("dataframe creation: {e}")))
}

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), CacheError> {
    let file = fs::File::create(path).map_err(|e| CacheError::Write(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| CacheError::Write(format!("write parquet: {e}")))?;
    Ok(())
}

/// Convert a snapshot DataFrame back into a table.
///
/// Nulls in value columns (e.g. from files written by other tools) become
/// NaN; a null date is an error.
fn dataframe_to_table(df: &DataFrame) -> Result<TimeSeriesTable, CacheError> {
    let map_err = |e: PolarsError| CacheError::Read(format!("column read: {e}"));

    let dates = df.column(DATE_COLUMN).map_err(map_err)?;
    let date_ca = dates
        .date()
        .map_err(|e| CacheError::Read(format!("date column type: {e}")))?;

    let epoch = epoch();
    let mut index = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca
            .get(i)
            .ok_or_else(|| CacheError::Read(format!("null date at row {i}")))?;
        index.push(epoch + chrono::Duration::days(days as i64));
    }

    let mut columns = Vec::with_capacity(df.width().saturating_sub(1));
    for col in df.get_columns() {
        let name = col.name().as_str();
        if name == DATE_COLUMN {
            continue;
        }
        let as_f64 = col.cast(&DataType::Float64).map_err(map_err)?;
        let values = as_f64
            .f64()
            .map_err(|e| CacheError::Read(format!("{name} column type: {e}")))?
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        columns.push(TableColumn::new(name, values));
    }

    TimeSeriesTable::new(index, columns)
        .map_err(|e| CacheError::Read(format!("invalid snapshot: {e}")))
}
