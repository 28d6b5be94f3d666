//! Durable monitor state.
//!
//! Two small text files coordinate the poller across processes:
//!
//! - `monitor.state` holds `running` while a poller should be active. Any
//!   other content, or no file at all, means stopped.
//! - `monitor.interval` holds the poll period in seconds.
//!
//! These files are the only cross-process source of truth. A status query
//! cannot tell a live worker from one whose process died with the flag
//! still in place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

pub const RUNNING_TOKEN: &str = "running";
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const STATE_FILE_NAME: &str = "monitor.state";
pub const INTERVAL_FILE_NAME: &str = "monitor.interval";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MonitorState {
    #[default]
    Stopped,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    /// Poll period, reported only while running.
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorFiles {
    state_file: PathBuf,
    interval_file: PathBuf,
}

impl MonitorFiles {
    pub fn new(state_file: PathBuf, interval_file: PathBuf) -> Self {
        Self {
            state_file,
            interval_file,
        }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(STATE_FILE_NAME), dir.join(INTERVAL_FILE_NAME))
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    pub fn interval_file(&self) -> &Path {
        &self.interval_file
    }

    /// Unreadable or foreign flag content counts as stopped.
    pub fn state(&self) -> MonitorState {
        match fs::read_to_string(&self.state_file) {
            Ok(contents) if contents.trim() == RUNNING_TOKEN => MonitorState::Running,
            _ => MonitorState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    pub fn flag_exists(&self) -> bool {
        self.state_file.exists()
    }

    /// Recorded poll period, or the default when absent or malformed.
    pub fn interval_secs(&self) -> u64 {
        fs::read_to_string(&self.interval_file)
            .ok()
            .and_then(|contents| contents.trim().parse().ok())
            .unwrap_or(DEFAULT_INTERVAL_SECS)
    }

    pub fn status(&self) -> MonitorStatus {
        let running = self.is_running();
        MonitorStatus {
            running,
            interval_secs: running.then(|| self.interval_secs()),
        }
    }

    pub fn write_interval(&self, interval_secs: u64) -> Result<(), LifecycleError> {
        write_token(&self.interval_file, &interval_secs.to_string())
    }

    pub fn write_flag(&self) -> Result<(), LifecycleError> {
        write_token(&self.state_file, RUNNING_TOKEN)
    }

    pub fn remove_flag(&self) -> Result<(), LifecycleError> {
        remove_if_exists(&self.state_file)
    }

    pub fn remove_interval(&self) -> Result<(), LifecycleError> {
        remove_if_exists(&self.interval_file)
    }
}

fn write_token(path: &Path, contents: &str) -> Result<(), LifecycleError> {
    let io_err = |source| LifecycleError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}

fn remove_if_exists(path: &Path) -> Result<(), LifecycleError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LifecycleError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_files_mean_stopped() {
        let dir = TempDir::new().unwrap();
        let files = MonitorFiles::in_dir(dir.path());

        assert_eq!(files.state(), MonitorState::Stopped);
        assert_eq!(
            files.status(),
            MonitorStatus {
                running: false,
                interval_secs: None
            }
        );
    }

    #[test]
    fn test_flag_content_must_be_running() {
        let dir = TempDir::new().unwrap();
        let files = MonitorFiles::in_dir(dir.path());

        fs::write(files.state_file(), "paused").unwrap();
        assert!(!files.is_running());
        assert!(files.flag_exists());

        fs::write(files.state_file(), "running\n").unwrap();
        assert!(files.is_running());
    }

    #[test]
    fn test_malformed_interval_falls_back() {
        let dir = TempDir::new().unwrap();
        let files = MonitorFiles::in_dir(dir.path());
        files.write_flag().unwrap();

        fs::write(files.interval_file(), "five minutes").unwrap();
        assert_eq!(files.status().interval_secs, Some(DEFAULT_INTERVAL_SECS));

        files.write_interval(60).unwrap();
        assert_eq!(files.status().interval_secs, Some(60));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let files = MonitorFiles::in_dir(dir.path().join("state"));

        files.write_flag().unwrap();
        files.remove_flag().unwrap();
        files.remove_flag().unwrap();
        files.remove_interval().unwrap();
        assert!(!files.flag_exists());
    }
}
