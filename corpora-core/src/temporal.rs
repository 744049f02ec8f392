//! Locale-tolerant date parsing used by the Type Classifier (§4.1) and to
//! build the epoch-second vectors the Profiler feeds into the Coverage
//! Analyzer (§4.3 step 5).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

const FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
];

/// Parse a single cell value as a date/time. Returns `(instant_epoch_secs,
/// hour_coarsened_epoch_secs)` on success, matching the original profiler's
/// `dt.replace(minute=0, second=0)` coverage-coarsening step.
pub fn parse_date(value: &str) -> Option<(f64, f64)> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        let utc = dt.with_timezone(&Utc);
        return Some((utc.timestamp() as f64, coarsen(utc)));
    }

    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            let utc = Utc.from_utc_datetime(&naive);
            return Some((utc.timestamp() as f64, coarsen(utc)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            let utc = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
            return Some((utc.timestamp() as f64, coarsen(utc)));
        }
    }
    None
}

fn coarsen(dt: DateTime<Utc>) -> f64 {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .unwrap_or(dt)
        .timestamp() as f64
}

/// Jan 1 UTC of `year`, epoch seconds. Used for the `year`-named-column
/// year-resolution parse in §4.1.
pub fn year_as_datetime(year: i32) -> Option<f64> {
    NaiveDate::from_ymd_opt(year, 1, 1).map(|d| {
        Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap())
            .timestamp() as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_date() {
        let (instant, _) = parse_date("2020-01-01").unwrap();
        assert_eq!(instant, year_as_datetime(2020).unwrap());
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_date("").is_none());
    }

    #[test]
    fn year_as_jan_first() {
        let ts = year_as_datetime(2001).unwrap();
        let dt = Utc.timestamp_opt(ts as i64, 0).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2001-01-01");
    }
}
