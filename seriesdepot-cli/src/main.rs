//! SeriesDepot CLI: load configured datasets and manage the snapshot cache.
//!
//! Commands:
//! - `load`: load every dataset in the configuration file (default)
//! - `cache status`: list snapshots with age, shape and size
//! - `cache clean`: remove snapshots older than a given number of days

mod log;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use seriesdepot_core::data::cache::read_snapshot;
use seriesdepot_core::data::{SnapshotCache, TimeSeriesTable, YahooProvider};
use seriesdepot_runner::config::{days, DEFAULT_CACHE_DIR, DEFAULT_CONFIG_FILE};
use seriesdepot_runner::{load_all_data, DatasetLoader, LoaderSettings, StdoutProgress};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rows shown per table after a load.
const PREVIEW_ROWS: usize = 3;

#[derive(Parser)]
#[command(
    name = "seriesdepot",
    about = "SeriesDepot: cached loader for market and economic time series"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every dataset listed in the configuration file.
    Load(LoadArgs),
    /// Snapshot cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct LoadArgs {
    /// Dataset configuration file (.yaml, .yml or .toml).
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Snapshot cache directory.
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Ignore existing snapshots and refetch every dataset.
    #[arg(long, default_value_t = false)]
    refresh: bool,

    /// Maximum snapshot age in days for remote datasets.
    #[arg(long, default_value_t = 1)]
    remote_expiry_days: u64,

    /// Maximum snapshot age in days for CSV datasets.
    #[arg(long, default_value_t = 30)]
    csv_expiry_days: u64,

    /// Base URL of the Yahoo Finance chart API.
    #[arg(long)]
    yahoo_url: Option<String>,
}

impl Default for LoadArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_FILE),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            refresh: false,
            remote_expiry_days: 1,
            csv_expiry_days: 30,
            yahoo_url: None,
        }
    }
}

#[derive(Subcommand)]
enum CacheAction {
    /// List snapshots with age, date range and size.
    Status {
        /// Snapshot cache directory.
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },
    /// Remove snapshots older than the given number of days.
    Clean {
        /// Remove snapshots older than this many days.
        #[arg(long)]
        older_than_days: u64,

        /// Snapshot cache directory.
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    log::init_logging(cli.verbose);

    match cli.command.unwrap_or_else(|| Commands::Load(LoadArgs::default())) {
        Commands::Load(args) => run_load(args),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Clean {
                older_than_days,
                cache_dir,
                confirm,
            } => run_cache_clean(&cache_dir, older_than_days, confirm),
        },
    }
}

fn run_load(args: LoadArgs) -> Result<()> {
    let settings = LoaderSettings {
        cache_dir: args.cache_dir,
        refresh: args.refresh,
        ..LoaderSettings::default()
    }
    .with_expiry_days(args.remote_expiry_days, args.csv_expiry_days);

    let provider = match args.yahoo_url {
        Some(url) => YahooProvider::with_base_url(url),
        None => YahooProvider::new(),
    }
    .context("failed to create Yahoo Finance client")?;

    let progress = StdoutProgress;
    let loader = DatasetLoader::new(settings, &provider).with_progress(&progress);

    let report = load_all_data(&args.config, &loader)
        .with_context(|| format!("could not load datasets from {}", args.config.display()))?;

    for (name, table) in report.tables() {
        println!();
        println!("{name}");
        print_head(table);
    }

    Ok(())
}

fn print_head(table: &TimeSeriesTable) {
    let names = table.column_names();
    print!("{:<12}", "Date");
    for name in &names {
        print!(" {name:>12}");
    }
    println!();
    for (date, values) in table.head(PREVIEW_ROWS) {
        print!("{:<12}", date.to_string());
        for value in values {
            print!(" {value:>12.4}");
        }
        println!();
    }
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    let cache = SnapshotCache::new(cache_dir);
    let entries = cache.entries()?;

    if entries.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();

    println!("Cache: {}", cache_dir.display());
    println!("Snapshots: {}", entries.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<20} {:>8} {:<25} {:>8} {:>10}",
        "Dataset", "Age", "Date Range", "Rows", "Size"
    );
    println!("{}", "-".repeat(75));
    for entry in &entries {
        let (range, rows) = match read_snapshot(&entry.path) {
            Ok(table) => match (table.first_date(), table.last_date()) {
                (Some(first), Some(last)) => (format!("{first} to {last}"), table.height()),
                _ => ("(empty)".to_string(), 0),
            },
            Err(_) => ("(unreadable)".to_string(), 0),
        };
        println!(
            "{:<20} {:>8} {:<25} {:>8} {:>10}",
            entry.key,
            format_age(entry.age),
            range,
            rows,
            format_size(entry.size_bytes)
        );
    }

    Ok(())
}

fn run_cache_clean(cache_dir: &Path, older_than_days: u64, confirm: bool) -> Result<()> {
    let cache = SnapshotCache::new(cache_dir);
    let cutoff = days(older_than_days);

    let to_remove: Vec<_> = cache
        .entries()?
        .into_iter()
        .filter(|e| e.age > cutoff)
        .collect();

    if to_remove.is_empty() {
        println!("No snapshots older than {older_than_days} days to remove.");
        return Ok(());
    }

    println!(
        "Found {} snapshot(s) older than {older_than_days} days:",
        to_remove.len()
    );
    for entry in &to_remove {
        println!(
            "  {} ({}, {})",
            entry.key,
            format_age(entry.age),
            format_size(entry.size_bytes)
        );
    }

    if !confirm {
        println!();
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    for entry in &to_remove {
        std::fs::remove_file(&entry.path)
            .with_context(|| format!("failed to remove {}", entry.path.display()))?;
        println!("Removed: {}", entry.key);
    }

    println!("Done. Removed {} snapshot(s).", to_remove.len());
    Ok(())
}

fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs < 60 * 60 {
        format!("{}m", secs / 60)
    } else if secs < 24 * 60 * 60 {
        format!("{}h", secs / (60 * 60))
    } else {
        format!("{}d", secs / (24 * 60 * 60))
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_load() {
        let cli = Cli::try_parse_from(["seriesdepot"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn load_flags_parse() {
        let cli = Cli::try_parse_from([
            "seriesdepot",
            "-v",
            "load",
            "--config",
            "my.toml",
            "--refresh",
            "--csv-expiry-days",
            "7",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Load(args)) => {
                assert_eq!(args.config, PathBuf::from("my.toml"));
                assert!(args.refresh);
                assert_eq!(args.csv_expiry_days, 7);
                assert_eq!(args.remote_expiry_days, 1);
                assert_eq!(args.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
            }
            _ => panic!("expected load command"),
        }
    }

    #[test]
    fn cache_clean_requires_age() {
        assert!(Cli::try_parse_from(["seriesdepot", "cache", "clean"]).is_err());
        assert!(Cli::try_parse_from(["seriesdepot", "cache", "clean", "--older-than-days", "7"]).is_ok());
    }

    #[test]
    fn sizes_and_ages_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_age(Duration::from_secs(90)), "1m");
        assert_eq!(format_age(Duration::from_secs(5 * 3600)), "5h");
        assert_eq!(format_age(Duration::from_secs(3 * 86400)), "3d");
    }
}
