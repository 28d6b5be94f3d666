//! On-disk shard format.
//!
//! A shard is a CSV file with a fixed header:
//!
//! ```text
//! timestamp,pressure_pa,pressure_hpa
//! 2024-03-01T12:00:00.000000Z,96231,962.31
//! ```
//!
//! Timestamps are written as RFC 3339 UTC with microseconds. Older files
//! written without an offset (`2024-03-01T12:00:00.123456`) hold the host's
//! local wall-clock time and are converted from `Local` to UTC on read.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::StoreError;
use crate::models::Reading;

pub const HEADER: &str = "timestamp,pressure_pa,pressure_hpa";

pub fn format_row(reading: &Reading) -> String {
    format!(
        "{},{},{:.2}",
        reading
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        reading.pressure_raw,
        reading.pressure_normalized
    )
}

pub fn parse_row(line: &str) -> Result<Reading, String> {
    let mut fields = line.split(',').map(str::trim);

    let timestamp = fields
        .next()
        .filter(|field| !field.is_empty())
        .ok_or_else(|| "missing timestamp".to_string())
        .and_then(parse_timestamp)?;
    let raw = fields
        .next()
        .ok_or_else(|| "missing pressure_pa".to_string())?;
    // Old writers emitted the raw value as a float ("96231.0").
    let raw = raw
        .parse::<u64>()
        .or_else(|_| match raw.parse::<f64>() {
            Ok(value) if value >= 0.0 && value.fract() == 0.0 => Ok(value as u64),
            _ => Err(()),
        })
        .map_err(|_| format!("invalid pressure_pa '{raw}'"))?;

    Ok(Reading::new(timestamp, raw))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|err| format!("invalid timestamp '{value}': {err}"))?;
    // Ambiguous fall-back hours resolve to the first occurrence.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("timestamp '{value}' does not exist in local time"))
}

/// Reads every row of a shard in file order. A missing shard reads as empty.
pub fn read_shard(path: &Path) -> Result<Vec<Reading>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::io(path, err)),
    };

    let mut readings = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|err| StoreError::io(path, err))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || (idx == 0 && trimmed.starts_with("timestamp")) {
            continue;
        }

        let reading = parse_row(trimmed).map_err(|reason| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        })?;
        readings.push(reading);
    }

    Ok(readings)
}

/// Appends one row, creating the shard and its header on first write.
pub fn append_row(path: &Path, reading: &Reading) -> Result<(), StoreError> {
    ensure_parent(path)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| StoreError::io(path, err))?;

    let is_new = file
        .metadata()
        .map_err(|err| StoreError::io(path, err))?
        .len()
        == 0;

    let mut line = String::new();
    if is_new {
        line.push_str(HEADER);
        line.push('\n');
    }
    line.push_str(&format_row(reading));
    line.push('\n');

    file.write_all(line.as_bytes())
        .and_then(|_| file.sync_data())
        .map_err(|err| StoreError::io(path, err))
}

/// Replaces `path` with a shard holding exactly `readings`.
///
/// The rows go to a sibling temp file which is renamed over `path` only
/// once fully written, so readers see either the old or the new shard.
pub fn write_shard_atomic(path: &Path, readings: &[Reading]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let tmp = temp_path(path);

    let result = write_all_rows(&tmp, readings).and_then(|_| {
        fs::rename(&tmp, path).map_err(|err| StoreError::io(path, err))
    });

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_all_rows(path: &Path, readings: &[Reading]) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|err| StoreError::io(path, err))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{HEADER}").map_err(|err| StoreError::io(path, err))?;
    for reading in readings {
        writeln!(writer, "{}", format_row(reading)).map_err(|err| StoreError::io(path, err))?;
    }

    let file = writer
        .into_inner()
        .map_err(|err| StoreError::io(path, err.into_error()))?;
    file.sync_all().map_err(|err| StoreError::io(path, err))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))
        }
        _ => Ok(()),
    }
}
