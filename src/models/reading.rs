//! Reading and credential data models.
//!
//! A `Reading` is a single barometer sample taken from the device status
//! page. Readings are immutable once created; the store only appends them
//! and relocates them in bulk during archival.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Raw device values are in pascals; dividing by this yields hPa.
pub const PA_PER_HPA: f64 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub pressure_raw: u64,
    pub pressure_normalized: f64,
}

impl Reading {
    /// Builds a reading for `timestamp`, truncated to the microsecond
    /// precision the shard files store.
    pub fn new(timestamp: DateTime<Utc>, pressure_raw: u64) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(6),
            pressure_raw,
            pressure_normalized: pressure_raw as f64 / PA_PER_HPA,
        }
    }

    pub fn now(pressure_raw: u64) -> Self {
        Self::new(Utc::now(), pressure_raw)
    }
}

/// Where and how to reach the device status page.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointCredential {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl EndpointCredential {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for EndpointCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointCredential")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
