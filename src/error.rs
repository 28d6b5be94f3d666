//! Error types for the acquisition pipeline, the time-series store and the
//! monitor lifecycle.

use std::path::PathBuf;

use thiserror::Error;

/// Which stage of page extraction failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no table found in status page")]
    NoTable,

    #[error("no 'Barometer Value' row found in status table")]
    RowNotFound,

    #[error("could not parse pressure from setting '{setting}'")]
    ValueUnparseable { setting: String },
}

/// Failure to obtain one reading from the device.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("authentication failed, check username/password")]
    Authentication,

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("connection error: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Disk failures while appending to, reading or archiving a shard.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error at path {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt row in {path:?} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors returned to callers of the monitor's start/stop operations.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Monitoring is already running")]
    AlreadyRunning,

    #[error("Monitoring is not running")]
    NotRunning,

    #[error("interval must be at least one second")]
    InvalidInterval,

    #[error("failed to update monitor state at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one fetch-parse-persist attempt.
#[derive(Error, Debug)]
pub enum TickError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
