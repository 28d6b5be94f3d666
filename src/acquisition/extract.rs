//! Status-page extraction.
//!
//! The device renders its settings as one HTML table with a `Field` and a
//! `Setting` column. The barometer row looks like:
//!
//! ```text
//! <tr><td>Barometer Value</td><td>Pressure = 96231</td></tr>
//! ```
//!
//! Scanning is local to the first `<table>` block. Tag detection is
//! case-insensitive and cell text is normalized (tags stripped, entities
//! decoded, whitespace collapsed) before comparison.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractionError;

pub const FIELD_COLUMN: &str = "Field";
pub const SETTING_COLUMN: &str = "Setting";
pub const BAROMETER_FIELD: &str = "Barometer Value";

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cell {
    text: String,
    header: bool,
}

/// Extracts the raw pressure (pascals) from the device status page.
pub fn extract_pressure(html: &str) -> Result<u64, ExtractionError> {
    let table = first_table(html).ok_or(ExtractionError::NoTable)?;
    let setting = barometer_setting(table)?;
    parse_leading_digits(&setting)
}

/// Returns the first run of ASCII digits in `setting` as an integer.
pub fn parse_leading_digits(setting: &str) -> Result<u64, ExtractionError> {
    let unparseable = || ExtractionError::ValueUnparseable {
        setting: setting.to_string(),
    };

    DIGIT_RUN
        .find(setting)
        .ok_or_else(unparseable)?
        .as_str()
        .parse::<u64>()
        .map_err(|_| unparseable())
}

fn barometer_setting(table: &str) -> Result<String, ExtractionError> {
    let rows = table_rows(table);

    let header_idx = rows
        .iter()
        .position(|row| !row.is_empty() && row.iter().all(|cell| cell.header))
        .or_else(|| rows.iter().position(|row| !row.is_empty()))
        .ok_or(ExtractionError::RowNotFound)?;

    let header = &rows[header_idx];
    let column = |name: &str| header.iter().position(|cell| cell.text == name);
    let (field_col, setting_col) = match (column(FIELD_COLUMN), column(SETTING_COLUMN)) {
        (Some(field), Some(setting)) => (field, setting),
        _ => return Err(ExtractionError::RowNotFound),
    };

    let row = rows[header_idx + 1..]
        .iter()
        .find(|row| {
            row.get(field_col)
                .is_some_and(|cell| cell.text == BAROMETER_FIELD)
        })
        .ok_or(ExtractionError::RowNotFound)?;

    Ok(row
        .get(setting_col)
        .map(|cell| cell.text.clone())
        .unwrap_or_default())
}

/// Content of the first `<table>` element, or `None` if the page has none.
/// An unterminated table runs to the end of the document.
fn first_table(html: &str) -> Option<&str> {
    let lower = html.to_ascii_lowercase();
    let open = find_open_tag(&lower, 0, "table")?;
    let body_start = tag_end(&lower, open)?;
    let body_end = find_close_tag(&lower, body_start, "table").unwrap_or(html.len());
    Some(&html[body_start..body_end])
}

fn table_rows(table: &str) -> Vec<Vec<Cell>> {
    let lower = table.to_ascii_lowercase();

    let mut starts = Vec::new();
    let mut cursor = 0;
    while let Some(pos) = find_open_tag(&lower, cursor, "tr") {
        starts.push(pos);
        cursor = pos + 3;
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let limit = starts.get(i + 1).copied().unwrap_or(table.len());
            let end = find_close_tag(&lower[..limit], start, "tr").unwrap_or(limit);
            row_cells(&table[start..end], &lower[start..end])
        })
        .collect()
}

fn row_cells(row: &str, lower: &str) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut cursor = 0;

    loop {
        let td = find_open_tag(lower, cursor, "td");
        let th = find_open_tag(lower, cursor, "th");
        let (open, header) = match (td, th) {
            (Some(d), Some(h)) if h < d => (h, true),
            (Some(d), _) => (d, false),
            (None, Some(h)) => (h, true),
            (None, None) => break,
        };

        let Some(content_start) = tag_end(lower, open) else {
            break;
        };

        let next_open = [
            find_open_tag(lower, content_start, "td"),
            find_open_tag(lower, content_start, "th"),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(lower.len());
        let close = [
            find_close_tag(lower, content_start, "td"),
            find_close_tag(lower, content_start, "th"),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(lower.len());
        let content_end = close.min(next_open);

        cells.push(Cell {
            text: normalize_text(&row[content_start..content_end]),
            header,
        });
        cursor = content_end;
    }

    cells
}

/// Position of the next `<name` that is a whole tag name (followed by `>`,
/// `/` or whitespace). `haystack` must already be lowercase.
fn find_open_tag(haystack: &str, from: usize, name: &str) -> Option<usize> {
    let needle = format!("<{name}");
    let bytes = haystack.as_bytes();
    let mut cursor = from;

    while let Some(found) = haystack.get(cursor..)?.find(&needle) {
        let pos = cursor + found;
        match bytes.get(pos + needle.len()) {
            Some(b'>') | Some(b'/') => return Some(pos),
            Some(c) if c.is_ascii_whitespace() => return Some(pos),
            None => return None,
            _ => cursor = pos + needle.len(),
        }
    }
    None
}

fn find_close_tag(haystack: &str, from: usize, name: &str) -> Option<usize> {
    let needle = format!("</{name}");
    haystack.get(from..)?.find(&needle).map(|pos| from + pos)
}

/// Index just past the `>` closing the tag that starts at `open`.
fn tag_end(haystack: &str, open: usize) -> Option<usize> {
    haystack[open..].find('>').map(|pos| open + pos + 1)
}

fn normalize_text(fragment: &str) -> String {
    let mut stripped = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                stripped.push(' ');
            }
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|ch| (ch, semi)));

        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = match name.strip_prefix('#')? {
                hex if hex.starts_with(['x', 'X']) => u32::from_str_radix(&hex[1..], 16).ok()?,
                dec => dec.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_page(rows: &str) -> String {
        format!(
            "<html><body><h1>Status</h1>\
             <table class=\"settings\">\
             <tr><th>Field</th><th>Setting</th></tr>{rows}</table></body></html>"
        )
    }

    #[test]
    fn test_extracts_pressure_from_status_table() {
        let html = status_page(
            "<tr><td>Uptime</td><td>3 days</td></tr>\
             <tr><td>Barometer Value</td><td>Pressure = 96231</td></tr>",
        );
        assert_eq!(extract_pressure(&html), Ok(96231));
    }

    #[test]
    fn test_tolerates_markup_noise() {
        let html = "<TABLE border=1>\n<THEAD><TR><TH>Field</TH>\n<TH> Setting </TH></TR></THEAD>\
                    <TBODY><TR><TD><b>Barometer&nbsp;Value</b></TD>\
                    <TD>Pressure&#32;=&#x20;101325</TD></TR></TBODY></TABLE>";
        assert_eq!(extract_pressure(html), Ok(101325));
    }

    #[test]
    fn test_header_row_without_th_cells() {
        let html = "<table><tr><td>Field</td><td>Setting</td></tr>\
                    <tr><td>Barometer Value</td><td>Pressure = 98000</td></tr></table>";
        assert_eq!(extract_pressure(html), Ok(98000));
    }

    #[test]
    fn test_unclosed_cells_and_rows() {
        let html = "<table><tr><th>Field<th>Setting\
                    <tr><td>Barometer Value<td>Pressure = 97500</table>";
        assert_eq!(extract_pressure(html), Ok(97500));
    }

    #[test]
    fn test_only_first_table_is_scanned() {
        let html = "<table><tr><th>Field</th><th>Setting</th></tr>\
                    <tr><td>Model</td><td>X1</td></tr></table>\
                    <table><tr><th>Field</th><th>Setting</th></tr>\
                    <tr><td>Barometer Value</td><td>Pressure = 1</td></tr></table>";
        assert_eq!(extract_pressure(html), Err(ExtractionError::RowNotFound));
    }

    #[test]
    fn test_no_table() {
        let html = "<html><body><p>Barometer Value: 96231</p></body></html>";
        assert_eq!(extract_pressure(html), Err(ExtractionError::NoTable));
    }

    #[test]
    fn test_tablet_tag_is_not_a_table() {
        let html = "<tablet><tr><td>Barometer Value</td></tr></tablet>";
        assert_eq!(extract_pressure(html), Err(ExtractionError::NoTable));
    }

    #[test]
    fn test_row_not_found() {
        let html = status_page("<tr><td>Temperature</td><td>21 C</td></tr>");
        assert_eq!(extract_pressure(&html), Err(ExtractionError::RowNotFound));
    }

    #[test]
    fn test_missing_columns_is_row_not_found() {
        let html = "<table><tr><th>Name</th><th>Value</th></tr>\
                    <tr><td>Barometer Value</td><td>Pressure = 96231</td></tr></table>";
        assert_eq!(extract_pressure(html), Err(ExtractionError::RowNotFound));
    }

    #[test]
    fn test_empty_table_is_row_not_found() {
        assert_eq!(
            extract_pressure("<table></table>"),
            Err(ExtractionError::RowNotFound)
        );
    }

    #[test]
    fn test_setting_without_digits() {
        let html = status_page("<tr><td>Barometer Value</td><td>Pressure = n/a</td></tr>");
        assert_eq!(
            extract_pressure(&html),
            Err(ExtractionError::ValueUnparseable {
                setting: "Pressure = n/a".to_string()
            })
        );
    }

    #[test]
    fn test_missing_setting_cell() {
        let html = status_page("<tr><td>Barometer Value</td></tr>");
        assert!(matches!(
            extract_pressure(&html),
            Err(ExtractionError::ValueUnparseable { .. })
        ));
    }

    #[test]
    fn test_first_digit_run_wins() {
        assert_eq!(parse_leading_digits("Pressure = 96231 (sensor 2)"), Ok(96231));
    }

    #[test]
    fn test_overflowing_digit_run_is_unparseable() {
        assert!(matches!(
            parse_leading_digits("Pressure = 999999999999999999999999"),
            Err(ExtractionError::ValueUnparseable { .. })
        ));
    }
}
