//! Progress reporting for a load run.

use crate::config::SourceKind;
use crate::data_loader::{DatasetOutcome, DatasetStatus, LoadReport};
use seriesdepot_core::data::TimeSeriesTable;

/// Progress callback for per-dataset loading.
pub trait LoadProgress {
    /// Called before a dataset is processed. `kind` is `None` for entries
    /// that were rejected while reading the configuration.
    fn on_start(&self, name: &str, kind: Option<SourceKind>, index: usize, total: usize);

    /// Called when a dataset has been loaded or skipped.
    fn on_complete(&self, outcome: &DatasetOutcome, table: Option<&TimeSeriesTable>);

    /// Called once after every entry has been processed.
    fn on_batch_complete(&self, report: &LoadReport);
}

/// Prints progress to stdout.
pub struct StdoutProgress;

impl LoadProgress for StdoutProgress {
    fn on_start(&self, name: &str, kind: Option<SourceKind>, index: usize, total: usize) {
        match kind {
            Some(kind) => println!("[{}/{}] {name} ({kind})", index + 1, total),
            None => println!("[{}/{}] {name}", index + 1, total),
        }
    }

    fn on_complete(&self, outcome: &DatasetOutcome, table: Option<&TimeSeriesTable>) {
        let shape = table
            .map(|t| format!("{} rows x {} columns", t.height(), t.width()))
            .unwrap_or_default();
        match &outcome.status {
            DatasetStatus::FromCache => println!("  OK: {} from cache, {shape}", outcome.name),
            DatasetStatus::Fetched { source, cached } => {
                let note = if *cached { "" } else { " (not cached)" };
                println!("  OK: {} from {source:?}, {shape}{note}", outcome.name);
            }
            DatasetStatus::Skipped(reason) => println!("  SKIP: {}: {reason}", outcome.name),
        }
    }

    fn on_batch_complete(&self, report: &LoadReport) {
        println!();
        for line in report.summary_lines() {
            println!("{line}");
        }
    }
}
