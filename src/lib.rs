pub mod acquisition;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod store;
pub mod utils;

use clap::Parser;

use cli::Cli;
use config::AppConfig;

pub use acquisition::{acquire_reading, Acquirer, ReadingSource};
pub use error::{AcquisitionError, ExtractionError, LifecycleError, StoreError, TickError};
pub use models::{EndpointCredential, Reading};
pub use monitor::{MonitorController, MonitorFiles, MonitorHandle, MonitorStatus};
pub use store::{ArchiveReport, ReadingStats, StorePaths, TimeSeriesStore};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    // Initialize logging (reads RUST_LOG env var)
    utils::logging::init_logging(config.log_file.as_deref())?;
    log::debug!("Loaded config - URL: {}", config.url);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(cli::execute(cli.command, config))
}
