//! Application configuration.
//!
//! Loaded from a JSON file, then overridden by environment variables:
//!
//! - `BAROLOG_URL`, `BAROLOG_USERNAME`, `BAROLOG_PASSWORD`
//! - `BAROLOG_WAIT_TIME` (seconds between readings)
//! - `BAROLOG_DATA_DIR`
//!
//! ```json
//! {
//!   "url": "https://192.168.1.1/status.html",
//!   "username": "admin",
//!   "password": "secret",
//!   "wait_time": 300
//! }
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::models::EndpointCredential;
use crate::monitor::{MonitorFiles, DEFAULT_INTERVAL_SECS};
use crate::store::StorePaths;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Seconds between readings.
    pub wait_time: u64,
    pub data_dir: PathBuf,
    /// Where log lines are appended besides stderr; `null` disables it.
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            wait_time: DEFAULT_INTERVAL_SECS,
            data_dir: PathBuf::from("data"),
            log_file: Some(PathBuf::from("barolog.log")),
        }
    }
}

impl AppConfig {
    /// Reads `path` (if it exists) and applies environment overrides.
    /// Commands that contact the device must also call [`AppConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            AppConfig::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("BAROLOG_URL") {
            self.url = url;
        }
        if let Ok(username) = env::var("BAROLOG_USERNAME") {
            self.username = username;
        }
        if let Ok(password) = env::var("BAROLOG_PASSWORD") {
            self.password = password;
        }
        if let Ok(wait_time) = env::var("BAROLOG_WAIT_TIME") {
            self.wait_time = wait_time
                .trim()
                .parse()
                .with_context(|| format!("BAROLOG_WAIT_TIME is not a number: {wait_time}"))?;
        }
        if let Ok(data_dir) = env::var("BAROLOG_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            bail!("url is required");
        }
        let url = Url::parse(&self.url).with_context(|| format!("invalid url '{}'", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("url must use http or https, got '{}'", url.scheme());
        }
        if self.username.trim().is_empty() {
            bail!("username is required");
        }
        if self.wait_time == 0 {
            bail!("wait_time must be greater than zero");
        }
        Ok(())
    }

    pub fn credential(&self) -> EndpointCredential {
        EndpointCredential::new(&self.url, &self.username, &self.password)
    }

    pub fn store_paths(&self) -> StorePaths {
        StorePaths::in_dir(&self.data_dir).with_log_file(self.log_file.clone())
    }

    pub fn monitor_files(&self) -> MonitorFiles {
        MonitorFiles::in_dir(&self.data_dir)
    }
}
