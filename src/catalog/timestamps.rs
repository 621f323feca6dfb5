//! Canonical file-time derivation from extracted metadata.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{Error, Result};

/// Metadata fields consulted for the canonical file time, in preference
/// order. `FileModifyDate` is the final fallback; every file is expected to
/// carry at least that one.
pub const FILE_TS_CANDIDATES: &[&str] = &[
    "DateTimeOriginal",
    "CreateDate",
    "TrackCreateDate",
    "SubSecCreateDate",
    "FileModifyDate",
];

/// Parse one exif-style timestamp of the form `YYYY:MM:DD HH:MM:SS`, with an
/// optional fractional second and timezone suffix (both ignored).
pub fn parse_exif_timestamp(input: &str) -> Option<NaiveDateTime> {
    let mut parts = input.split_whitespace();
    let date = parts.next()?;
    let time = parts.next()?;

    let mut date_parts = date.split(':');
    let year: i32 = date_parts.next()?.parse().ok()?;
    let month: u32 = date_parts.next()?.parse().ok()?;
    let day: u32 = date_parts.next()?.parse().ok()?;
    if date_parts.next().is_some() {
        return None;
    }

    // Strip fraction and timezone: everything from the first character that
    // is neither a digit nor a colon.
    let end = time
        .find(|c: char| !c.is_ascii_digit() && c != ':')
        .unwrap_or(time.len());
    let mut time_parts = time[..end].split(':');
    let hour: u32 = time_parts.next()?.parse().ok()?;
    let minute: u32 = time_parts.next()?.parse().ok()?;
    let second: u32 = time_parts.next()?.parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Derive the canonical file time: the first candidate field that parses.
///
/// Failing every candidate is fatal for the file being reconciled and must
/// be investigated as a data-quality issue rather than silently defaulted.
pub fn derive_file_ts(exif: &JsonValue) -> Result<NaiveDateTime> {
    let mut attempted = Vec::new();
    for key in FILE_TS_CANDIDATES {
        let Some(value) = exif.get(*key) else {
            continue;
        };
        let Some(text) = value.as_str() else {
            attempted.push(value.to_string());
            continue;
        };
        match parse_exif_timestamp(text) {
            Some(ts) => return Ok(ts),
            None => {
                debug!(field = key, value = text, "timestamp candidate did not parse");
                attempted.push(text.to_string());
            }
        }
    }
    Err(Error::UnparseableTimestamp(attempted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn parses_plain_timestamp() {
        assert_eq!(
            parse_exif_timestamp("2019:09:21 15:17:06"),
            Some(ts("2019-09-21 15:17:06"))
        );
    }

    #[test]
    fn ignores_fraction_and_timezone() {
        assert_eq!(
            parse_exif_timestamp("2019:09:21 15:17:06.167"),
            Some(ts("2019-09-21 15:17:06"))
        );
        assert_eq!(
            parse_exif_timestamp("2019:09:21 15:17:06+02:00"),
            Some(ts("2019-09-21 15:17:06"))
        );
        assert_eq!(
            parse_exif_timestamp("2019:09:21 15:17:06.167-07:00"),
            Some(ts("2019-09-21 15:17:06"))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_exif_timestamp("0000:00:00 00:00:00"), None);
        assert_eq!(parse_exif_timestamp("not a date"), None);
        assert_eq!(parse_exif_timestamp(""), None);
    }

    #[test]
    fn prefers_capture_date_over_modify_date() {
        let exif = serde_json::json!({
            "DateTimeOriginal": "2019:09:21 15:17:06",
            "FileModifyDate": "2023:05:01 10:00:00",
        });
        assert_eq!(derive_file_ts(&exif).unwrap(), ts("2019-09-21 15:17:06"));
    }

    #[test]
    fn falls_back_past_unparseable_candidates() {
        let exif = serde_json::json!({
            "CreateDate": "0000:00:00 00:00:00",
            "FileModifyDate": "2023:05:01 10:00:00",
        });
        assert_eq!(derive_file_ts(&exif).unwrap(), ts("2023-05-01 10:00:00"));
    }

    #[test]
    fn fails_when_nothing_parses() {
        let exif = serde_json::json!({"CreateDate": "0000:00:00 00:00:00"});
        let err = derive_file_ts(&exif).unwrap_err();
        assert!(matches!(err, Error::UnparseableTimestamp(_)));
    }
}
