//! Acquisition pipeline: authenticate, fetch, extract, normalize.

pub mod client;
pub mod extract;

pub use client::{Acquirer, ReadingSource, FETCH_TIMEOUT};
pub use extract::extract_pressure;

use crate::error::AcquisitionError;
use crate::models::{EndpointCredential, Reading};

/// Runs the pipeline once against `credential`.
pub async fn acquire_reading(credential: &EndpointCredential) -> Result<Reading, AcquisitionError> {
    Acquirer::new(credential.clone())?.acquire_reading().await
}
