use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    acquisition::ReadingSource,
    error::{StoreError, TickError},
    models::Reading,
    store::TimeSeriesStore,
};

use super::state::MonitorFiles;

/// Granularity of the inter-tick sleep; bounds how long a stop takes to
/// be noticed.
pub const SLEEP_STEP: Duration = Duration::from_secs(1);

pub(crate) struct MonitorSession {
    pub files: MonitorFiles,
    pub store: TimeSeriesStore,
    pub source: Arc<dyn ReadingSource>,
    pub interval: Duration,
    /// Generation this worker was started as.
    pub generation: u64,
    /// Latest generation started by the owning controller.
    pub current: Arc<AtomicU64>,
}

impl MonitorSession {
    /// False once the controller has started a newer worker.
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn should_continue(&self, cancel_token: &CancellationToken) -> bool {
        !cancel_token.is_cancelled() && self.is_current() && self.files.is_running()
    }
}

/// Acquires one reading and appends it to the store.
pub async fn run_tick(
    source: &dyn ReadingSource,
    store: &TimeSeriesStore,
) -> Result<Reading, TickError> {
    let reading = source.acquire_reading().await?;

    let store = store.clone();
    tokio::task::spawn_blocking(move || store.append(&reading))
        .await
        .map_err(|err| StoreError::Task(err.to_string()))??;

    Ok(reading)
}

pub(crate) async fn monitor_loop(session: MonitorSession, cancel_token: CancellationToken) {
    while session.should_continue(&cancel_token) {
        match run_tick(session.source.as_ref(), &session.store).await {
            Ok(reading) => info!(
                "Background scrape: {:.2} hPa",
                reading.pressure_normalized
            ),
            Err(err) => error!("Background scrape failed: {err}"),
        }

        if !sleep_between_ticks(&session, &cancel_token).await {
            break;
        }
    }

    // A superseded worker must not clear the flag its successor wrote.
    if session.is_current() {
        if let Err(err) = session.files.remove_flag() {
            warn!("failed to clear monitor flag on exit: {err}");
        }
    }
    info!("Background monitoring stopped");
}

/// Sleeps for the session interval in `SLEEP_STEP` slices, re-reading the
/// flag before each one. Returns `false` as soon as a stop is observed.
async fn sleep_between_ticks(session: &MonitorSession, cancel_token: &CancellationToken) -> bool {
    let mut remaining = session.interval;

    while !remaining.is_zero() {
        if !session.should_continue(cancel_token) {
            return false;
        }

        let step = remaining.min(SLEEP_STEP);
        tokio::select! {
            _ = tokio::time::sleep(step) => {}
            _ = cancel_token.cancelled() => return false,
        }
        remaining = remaining.saturating_sub(step);
    }

    true
}
