use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Reading;

/// Summary of a set of readings, in hPa.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    pub count: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub latest: Reading,
    pub min_hpa: f64,
    pub max_hpa: f64,
    pub mean_hpa: f64,
}

impl ReadingStats {
    /// `readings` must be sorted ascending by timestamp, as `load` returns
    /// them. Returns `None` for an empty slice.
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        let first = readings.first()?;
        let latest = *readings.last()?;

        let (min_hpa, max_hpa, sum) = readings.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), reading| {
                let hpa = reading.pressure_normalized;
                (min.min(hpa), max.max(hpa), sum + hpa)
            },
        );

        Some(Self {
            count: readings.len(),
            first: first.timestamp,
            last: latest.timestamp,
            latest,
            min_hpa,
            max_hpa,
            mean_hpa: sum / readings.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_stats_summary() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let readings = vec![
            Reading::new(t0, 96000),
            Reading::new(t0 + Duration::hours(1), 99000),
            Reading::new(t0 + Duration::hours(2), 97500),
        ];

        let stats = ReadingStats::from_readings(&readings).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.first, t0);
        assert_eq!(stats.last, t0 + Duration::hours(2));
        assert_eq!(stats.latest.pressure_raw, 97500);
        assert!((stats.min_hpa - 960.0).abs() < 1e-9);
        assert!((stats.max_hpa - 990.0).abs() < 1e-9);
        assert!((stats.mean_hpa - 975.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_has_no_stats() {
        assert!(ReadingStats::from_readings(&[]).is_none());
    }
}
