use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use crate::{
    acquisition::{Acquirer, ReadingSource},
    config::{AppConfig, DEFAULT_CONFIG_FILE},
    monitor::MonitorController,
    store::{shard::format_row, TimeSeriesStore},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "BAROLOG_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start polling in this process until `stop` is run or Ctrl+C is pressed
    Monitor {
        /// Seconds between readings (defaults to `wait_time` from the config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Signal a running monitor to stop
    Stop,
    /// Show whether a monitor is running
    Status,
    /// Take one reading now and store it
    Scrape,
    /// Print recent readings
    Show {
        /// Include archived shards
        #[arg(long)]
        archives: bool,
        /// Number of most recent readings to print
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Summarize stored readings
    Stats {
        #[arg(long)]
        archives: bool,
    },
    /// Move old readings and oversized logs into the archive
    Archive {
        #[arg(long, default_value_t = 90)]
        keep_days: u32,
        /// Archive even while a monitor is running
        #[arg(long)]
        force: bool,
    },
}

pub async fn execute(command: Command, config: AppConfig) -> Result<()> {
    let store = TimeSeriesStore::new(config.store_paths());
    let controller = MonitorController::new(config.monitor_files(), store.clone());

    match command {
        Command::Monitor { interval } => {
            config.validate()?;
            let source: Arc<dyn ReadingSource> = Arc::new(Acquirer::new(config.credential())?);
            let handle = controller
                .start(source, interval.unwrap_or(config.wait_time))
                .await?;
            println!("{}", handle.message());
            info!("Press Ctrl+C to stop");

            let interrupt = controller.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping monitor");
                    if let Err(err) = interrupt.stop() {
                        warn!("failed to stop monitor: {err}");
                    }
                }
            });

            handle.join().await?;
        }
        Command::Stop => {
            controller.stop()?;
            println!("Monitoring stopped");
        }
        Command::Status => {
            let status = controller.status();
            match status.interval_secs {
                Some(interval) if status.running => {
                    println!("Monitoring is running (interval: {interval}s)")
                }
                _ => println!("Monitoring is not running"),
            }
        }
        Command::Scrape => {
            config.validate()?;
            let acquirer = Acquirer::new(config.credential())?;
            let reading = controller.run_once(&acquirer).await?;
            println!(
                "Pressure: {:.2} hPa ({} Pa)",
                reading.pressure_normalized, reading.pressure_raw
            );
        }
        Command::Show { archives, limit } => {
            let readings = store.load(archives)?;
            let skip = readings.len().saturating_sub(limit);
            for reading in &readings[skip..] {
                println!("{}", format_row(reading));
            }
        }
        Command::Stats { archives } => match store.statistics(archives)? {
            Some(stats) => {
                println!("Readings: {}", stats.count);
                println!("Range:    {} .. {}", stats.first, stats.last);
                println!("Latest:   {:.2} hPa", stats.latest.pressure_normalized);
                println!("Min:      {:.2} hPa", stats.min_hpa);
                println!("Max:      {:.2} hPa", stats.max_hpa);
                println!("Mean:     {:.2} hPa", stats.mean_hpa);
            }
            None => println!("No readings recorded yet"),
        },
        Command::Archive { keep_days, force } => {
            if controller.status().running && !force {
                bail!("monitor is running; stop it first or pass --force");
            }
            let report = store.archive(keep_days)?;
            if report.is_noop() {
                println!("Nothing to archive");
            } else {
                println!(
                    "Archived {} readings and {} log bytes",
                    report.archived_count, report.archived_log_bytes
                );
            }
        }
    }

    Ok(())
}
