use chrono::{DateTime, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

// Cells exported from dataframes use these for missing values.
fn is_missing(text: &str) -> bool {
    matches!(text, "" | "NaN" | "nan" | "NaT" | "None" | "null")
}

/// Parses a timestamp cell into epoch seconds.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC) and
/// integer epoch seconds. `Ok(None)` means the cell is empty.
pub fn parse_timestamp(text: &str) -> anyhow::Result<Option<i64>> {
    let text = text.trim();
    if is_missing(text) {
        return Ok(None);
    }
    if let Ok(seconds) = text.parse::<i64>() {
        return Ok(Some(seconds));
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(time.timestamp()));
    }
    for format in NAIVE_FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(time.and_utc().timestamp()));
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(time) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(time.and_utc().timestamp()));
        }
    }
    Err(anyhow!("unrecognized timestamp: {}", text))
}

pub fn parse_optional_f64(text: &str) -> anyhow::Result<Option<f64>> {
    let text = text.trim();
    if is_missing(text) {
        return Ok(None);
    }
    Ok(Some(text.parse::<f64>()?))
}

pub fn format_timestamp(seconds: i64) -> String {
    match DateTime::<Utc>::from_timestamp(seconds, 0) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => seconds.to_string(),
    }
}
