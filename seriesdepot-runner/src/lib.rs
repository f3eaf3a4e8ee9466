//! SeriesDepot Runner: dataset configuration and the load loop.
//!
//! This crate builds on `seriesdepot-core` to provide:
//! - YAML/TOML dataset configuration validated into typed descriptors
//! - `LoaderSettings` for the cache directory and expiry windows
//! - The cache-or-fetch loop with per-dataset failure isolation
//! - Progress reporting and the end-of-run summary

pub mod config;
pub mod data_loader;
pub mod progress;

pub use config::{
    ConfigEntry, ConfigError, CsvDescriptor, DatasetConfig, DatasetDescriptor, DescriptorError,
    LoaderSettings, RemoteDescriptor, SourceKind,
};
pub use data_loader::{
    load_all_data, Collection, DatasetLoader, DatasetOutcome, DatasetStatus, LoadReport,
    SkipReason,
};
pub use progress::{LoadProgress, StdoutProgress};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<DatasetConfig>();
        assert_sync::<DatasetConfig>();
        assert_send::<LoaderSettings>();
        assert_sync::<LoaderSettings>();
    }

    #[test]
    fn load_report_is_send_sync() {
        assert_send::<LoadReport>();
        assert_sync::<LoadReport>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
        assert_send::<SkipReason>();
        assert_sync::<SkipReason>();
    }
}
