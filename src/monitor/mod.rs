pub mod controller;
pub mod state;
pub mod worker;

pub use controller::{MonitorController, MonitorHandle};
pub use state::{MonitorFiles, MonitorState, MonitorStatus, DEFAULT_INTERVAL_SECS};
pub use worker::run_tick;
