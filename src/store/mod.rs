//! Append-only time-series store for barometer readings.
//!
//! Readings live in an *active* shard (`readings.csv` under the data
//! directory) and in zero or more *archived* shards, one per year-month
//! directory under the archive root:
//!
//! ```text
//! data/readings.csv
//! data/archive/2024-01/readings.csv
//! data/archive/2024-01/barolog-20240131T235900.log
//! ```
//!
//! The store takes no file locks. It assumes a single writer: callers must
//! not archive while a monitor is appending to the same active shard.

mod archive;
pub mod shard;
mod stats;

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;

use crate::error::StoreError;
use crate::models::Reading;

pub use archive::{ArchiveReport, LOG_ROTATE_BYTES};
pub use stats::ReadingStats;

/// File name shared by the active shard and every archived shard.
pub const SHARD_FILE_NAME: &str = "readings.csv";
pub const ARCHIVE_DIR_NAME: &str = "archive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub active: PathBuf,
    pub archive_root: PathBuf,
    /// Log file rotated into the archive when it grows too large.
    pub log_file: Option<PathBuf>,
}

impl StorePaths {
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            active: data_dir.join(SHARD_FILE_NAME),
            archive_root: data_dir.join(ARCHIVE_DIR_NAME),
            log_file: None,
        }
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    paths: Arc<StorePaths>,
}

impl TimeSeriesStore {
    pub fn new(paths: StorePaths) -> Self {
        Self {
            paths: Arc::new(paths),
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Appends one reading to the active shard.
    pub fn append(&self, reading: &Reading) -> Result<(), StoreError> {
        shard::append_row(&self.paths.active, reading)?;
        debug!("Saved reading to {}", self.paths.active.display());
        Ok(())
    }

    /// Loads readings, optionally merging every archived shard.
    ///
    /// Merge order is: archived shards in ascending lexical order of their
    /// directory names (chronological for `YYYY-MM`), then the active shard.
    /// When two records share a timestamp the one merged later wins, so the
    /// active shard overrides archives and newer months override older ones.
    /// The result is sorted ascending by timestamp. A store with no active
    /// shard yields an empty vector.
    pub fn load(&self, include_archives: bool) -> Result<Vec<Reading>, StoreError> {
        let mut shards = Vec::new();
        if include_archives {
            shards.extend(self.archived_shards()?);
        }
        shards.push(self.paths.active.clone());

        let mut merged: BTreeMap<DateTime<Utc>, Reading> = BTreeMap::new();
        for path in &shards {
            for reading in shard::read_shard(path)? {
                merged.insert(reading.timestamp, reading);
            }
        }

        debug!("Loaded {} readings from {} shard(s)", merged.len(), shards.len());
        Ok(merged.into_values().collect())
    }

    /// The newest reading in the active shard.
    pub fn latest(&self) -> Result<Option<Reading>, StoreError> {
        Ok(self.load(false)?.pop())
    }

    pub fn statistics(&self, include_archives: bool) -> Result<Option<ReadingStats>, StoreError> {
        Ok(ReadingStats::from_readings(&self.load(include_archives)?))
    }

    /// Archived shard files in merge order.
    fn archived_shards(&self) -> Result<Vec<PathBuf>, StoreError> {
        let root = &self.paths.archive_root;
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(root, err)),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(root, err))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(dirs
            .into_iter()
            .map(|dir| dir.join(SHARD_FILE_NAME))
            .filter(|shard| shard.is_file())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> TimeSeriesStore {
        TimeSeriesStore::new(StorePaths::in_dir(dir.path()))
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn test_load_without_active_shard_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load(true).unwrap().is_empty());
        assert!(store(&dir).latest().unwrap().is_none());
    }

    #[test]
    fn test_load_returns_appended_readings_in_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let readings: Vec<Reading> = (0..5).map(|i| Reading::new(at(i), 96000 + i as u64)).collect();
        for reading in &readings {
            store.append(reading).unwrap();
        }

        assert_eq!(store.load(false).unwrap(), readings);
        assert_eq!(store.latest().unwrap(), Some(readings[4]));
    }

    #[test]
    fn test_load_sorts_out_of_order_appends() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.append(&Reading::new(at(10), 2)).unwrap();
        store.append(&Reading::new(at(5), 1)).unwrap();

        let loaded = store.load(false).unwrap();
        assert_eq!(loaded.iter().map(|r| r.pressure_raw).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_archives_merge_with_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let root = &store.paths().archive_root;

        shard::write_shard_atomic(
            &root.join("2024-01").join(SHARD_FILE_NAME),
            &[Reading::new(at(0), 100), Reading::new(at(1), 101)],
        )
        .unwrap();
        shard::write_shard_atomic(
            &root.join("2024-02").join(SHARD_FILE_NAME),
            &[Reading::new(at(1), 201), Reading::new(at(2), 202)],
        )
        .unwrap();
        store.append(&Reading::new(at(2), 302)).unwrap();
        store.append(&Reading::new(at(3), 303)).unwrap();

        let merged = store.load(true).unwrap();
        assert_eq!(
            merged.iter().map(|r| r.pressure_raw).collect::<Vec<_>>(),
            vec![100, 201, 302, 303]
        );

        let active_only = store.load(false).unwrap();
        assert_eq!(active_only.len(), 2);
    }

    #[test]
    fn test_statistics_over_store() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.statistics(false).unwrap().is_none());

        store.append(&Reading::new(at(0), 96000)).unwrap();
        store.append(&Reading::new(at(1), 98000)).unwrap();

        let stats = store.statistics(false).unwrap().unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.mean_hpa - 970.0).abs() < 1e-9);
    }
}
