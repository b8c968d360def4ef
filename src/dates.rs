//! Date normalization helpers.
//!
//! Activity exports use `M/D/YYYY`, while SMS and survey exports carry
//! `YYYY-MM-DD HH:MM:SS` timestamps. Everything is reduced to `YYYY-MM-DD`
//! strings so the sources can be joined on plain text keys.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{MergeError, Result};

/// Re-format an `M/D/YYYY` date as `YYYY-MM-DD`.
///
/// Month and day are zero-padded to two digits. The input must contain
/// exactly two `/` separators.
///
/// # Examples
///
/// ```
/// use health_merge::dates::format_date;
///
/// assert_eq!(format_date("3/4/2020").unwrap(), "2020-03-04");
/// ```
pub fn format_date(raw: &str) -> Result<String> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    let [month, day, year] = parts.as_slice() else {
        return Err(MergeError::Format(format!(
            "expected M/D/YYYY date, got {raw:?}"
        )));
    };

    Ok(format!("{year}-{month:0>2}-{day:0>2}"))
}

/// Take the date part of a `YYYY-MM-DD HH:MM:SS` timestamp.
///
/// Anything without a time component (no `:`) or a missing value yields
/// `None`; this never fails.
#[must_use]
pub fn safe_extract_date(value: Option<&str>) -> Option<String> {
    let value = value?;
    if !value.contains(':') {
        return None;
    }
    value.split_whitespace().next().map(str::to_string)
}

/// Convert a date or timestamp to whole seconds since the Unix epoch (UTC).
///
/// Accepts `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD` (midnight). Missing
/// and unparseable values yield `None`.
#[must_use]
pub fn to_epoch_seconds(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();

    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(timestamp.and_utc().timestamp());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_format_date_pads_month_and_day() {
        assert_eq!(format_date("3/4/2020").unwrap(), "2020-03-04");
        assert_eq!(format_date("12/25/2019").unwrap(), "2019-12-25");
    }

    #[test]
    fn test_format_date_rejects_wrong_separator_count() {
        assert!(matches!(format_date("2020-03-04"), Err(MergeError::Format(_))));
        assert!(format_date("3/4").is_err());
        assert!(format_date("3/4/2020/1").is_err());
    }

    #[test]
    fn test_safe_extract_date() {
        assert_eq!(
            safe_extract_date(Some("2020-04-08 11:32:50")).as_deref(),
            Some("2020-04-08")
        );
        assert_eq!(safe_extract_date(Some("garbage")), None);
        assert_eq!(safe_extract_date(Some("")), None);
        assert_eq!(safe_extract_date(None), None);
    }

    #[test]
    fn test_to_epoch_seconds() {
        assert_eq!(to_epoch_seconds(None), None);
        assert_eq!(to_epoch_seconds(Some("1970-01-02")), Some(86_400));
        assert_eq!(to_epoch_seconds(Some("1970-01-01 00:01:40")), Some(100));
        assert_eq!(to_epoch_seconds(Some("not a date")), None);
    }

    proptest! {
        #[test]
        fn format_date_is_sortable_iso(year in 1970u32..2100, month in 1u32..=12, day in 1u32..=28) {
            let formatted = format_date(&format!("{month}/{day}/{year}")).unwrap();
            prop_assert_eq!(formatted.len(), 10);
            let parsed = NaiveDate::parse_from_str(&formatted, "%Y-%m-%d").unwrap();
            prop_assert_eq!(parsed, NaiveDate::from_ymd_opt(year as i32, month, day).unwrap());
        }
    }
}
