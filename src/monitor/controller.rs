use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    acquisition::ReadingSource,
    error::{LifecycleError, TickError},
    models::Reading,
    store::TimeSeriesStore,
};

use super::state::{MonitorFiles, MonitorStatus};
use super::worker::{monitor_loop, run_tick, MonitorSession};

/// Starts, stops and reports on the background poller.
///
/// The controller itself holds no worker; `start` hands the caller a
/// [`MonitorHandle`] for in-process control, while the flag file remains
/// the signal every process (and the worker) obeys.
///
/// Clones share a worker generation counter. Each `start` supersedes any
/// worker an earlier `start` on this controller spawned, so a quick
/// `stop` then `start` never leaves two loops polling in one process.
#[derive(Debug, Clone)]
pub struct MonitorController {
    files: MonitorFiles,
    store: TimeSeriesStore,
    generation: Arc<AtomicU64>,
}

impl MonitorController {
    pub fn new(files: MonitorFiles, store: TimeSeriesStore) -> Self {
        Self {
            files,
            store,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn files(&self) -> &MonitorFiles {
        &self.files
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    /// Writes the interval and flag, then spawns the poller.
    ///
    /// The running check and the flag write are not atomic: two processes
    /// racing here can both start a poller against the same store.
    pub async fn start(
        &self,
        source: Arc<dyn ReadingSource>,
        interval_secs: u64,
    ) -> Result<MonitorHandle, LifecycleError> {
        if self.files.is_running() {
            return Err(LifecycleError::AlreadyRunning);
        }
        if interval_secs == 0 {
            return Err(LifecycleError::InvalidInterval);
        }

        // Retire the previous worker before it can see the new flag.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Err(err) = self
            .files
            .write_interval(interval_secs)
            .and_then(|_| self.files.write_flag())
        {
            let _ = self.files.remove_flag();
            return Err(err);
        }

        let cancel_token = CancellationToken::new();
        let session = MonitorSession {
            files: self.files.clone(),
            store: self.store.clone(),
            source,
            interval: Duration::from_secs(interval_secs),
            generation,
            current: Arc::clone(&self.generation),
        };
        let handle = tokio::spawn(monitor_loop(session, cancel_token.clone()));

        info!("Monitoring started (interval: {interval_secs}s)");
        Ok(MonitorHandle {
            handle,
            cancel_token,
            interval_secs,
        })
    }

    /// Clears the flag and interval record. The worker notices within one
    /// sleep step and exits on its own.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        if !self.files.flag_exists() {
            return Err(LifecycleError::NotRunning);
        }

        self.files.remove_flag()?;
        self.files.remove_interval()?;
        info!("Monitoring stop requested");
        Ok(())
    }

    pub fn status(&self) -> MonitorStatus {
        self.files.status()
    }

    /// One fetch-parse-persist attempt outside the poll loop.
    pub async fn run_once(&self, source: &dyn ReadingSource) -> Result<Reading, TickError> {
        run_tick(source, &self.store).await
    }
}

/// In-process handle to a running poller.
///
/// Dropping the handle leaves the worker running; only the flag file or
/// [`MonitorHandle::cancel`] stops it.
pub struct MonitorHandle {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
    interval_secs: u64,
}

impl MonitorHandle {
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn message(&self) -> String {
        format!("Monitoring started (interval: {}s)", self.interval_secs)
    }

    /// Wakes the worker immediately; it clears the flag as it exits.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker to exit, however it was told to stop.
    pub async fn join(self) -> Result<()> {
        self.handle
            .await
            .context("monitor loop task failed to join")
    }

    pub async fn stop(self) -> Result<()> {
        self.cancel();
        self.join().await
    }
}
