use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::Reading;

use super::shard::{read_shard, write_shard_atomic};
use super::{TimeSeriesStore, SHARD_FILE_NAME};

/// Logs above this size are moved into the archive.
pub const LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    pub archived_count: usize,
    pub archived_log_bytes: u64,
    /// Set when anything was written into the archive.
    pub archive_dir: Option<PathBuf>,
}

impl ArchiveReport {
    pub fn is_noop(&self) -> bool {
        self.archived_count == 0 && self.archived_log_bytes == 0
    }
}

impl TimeSeriesStore {
    /// Moves readings older than `keep_days` into this month's archive shard.
    pub fn archive(&self, keep_days: u32) -> Result<ArchiveReport, StoreError> {
        self.archive_at(Utc::now(), keep_days)
    }

    /// `archive` with an explicit notion of "now".
    ///
    /// The archive shard is committed before the active shard is rewritten.
    /// If the second step fails the old rows exist in both places; `load`
    /// collapses them by timestamp, so nothing is lost and the active shard
    /// is left as it was.
    ///
    /// A `keep_days` reaching past the earliest representable date keeps
    /// every reading.
    pub fn archive_at(&self, now: DateTime<Utc>, keep_days: u32) -> Result<ArchiveReport, StoreError> {
        let cutoff = now.checked_sub_signed(Duration::days(i64::from(keep_days)));
        let archive_dir = self.paths.archive_root.join(now.format("%Y-%m").to_string());
        let mut report = ArchiveReport::default();

        if let Some(cutoff) = cutoff {
            report = self.archive_before(cutoff, &archive_dir)?;
        }

        if let Some(log_file) = &self.paths.log_file {
            report.archived_log_bytes = rotate_log(log_file, &archive_dir, now)?;
            if report.archived_log_bytes > 0 {
                report.archive_dir = Some(archive_dir);
            }
        }

        Ok(report)
    }

    fn archive_before(&self, cutoff: DateTime<Utc>, archive_dir: &Path) -> Result<ArchiveReport, StoreError> {
        let mut report = ArchiveReport::default();

        let (old, recent): (Vec<Reading>, Vec<Reading>) = read_shard(&self.paths.active)?
            .into_iter()
            .partition(|reading| reading.timestamp < cutoff);

        if !old.is_empty() {
            let archive_shard = archive_dir.join(SHARD_FILE_NAME);
            let mut archived = read_shard(&archive_shard)?;
            archived.extend_from_slice(&old);

            write_shard_atomic(&archive_shard, &archived)?;
            write_shard_atomic(&self.paths.active, &recent)?;

            info!(
                "Archived {} readings older than {} to {}",
                old.len(),
                cutoff.format("%Y-%m-%d"),
                archive_shard.display()
            );
            report.archived_count = old.len();
            report.archive_dir = Some(archive_dir.to_path_buf());
        }

        Ok(report)
    }
}

/// Copies an oversized log into `archive_dir` and truncates it in place.
/// Returns the number of bytes archived, zero if no rotation was needed.
fn rotate_log(log_file: &Path, archive_dir: &Path, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let size = match fs::metadata(log_file) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(StoreError::io(log_file, err)),
    };
    if size <= LOG_ROTATE_BYTES {
        return Ok(0);
    }

    fs::create_dir_all(archive_dir).map_err(|err| StoreError::io(archive_dir, err))?;
    let target = archive_dir.join(format!("barolog-{}.log", now.format("%Y%m%dT%H%M%S")));
    let copied = fs::copy(log_file, &target).map_err(|err| StoreError::io(&target, err))?;

    OpenOptions::new()
        .write(true)
        .open(log_file)
        .and_then(|file| file.set_len(0))
        .map_err(|err| StoreError::io(log_file, err))?;

    info!("Rotated {} bytes of log into {}", copied, target.display());
    Ok(copied)
}
